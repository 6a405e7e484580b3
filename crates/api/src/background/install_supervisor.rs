//! Background installs of Python environments.
//!
//! Handlers and the startup verifier submit [`InstallJob`]s through an
//! [`InstallQueue`]. The [`InstallSupervisor`] owns a `JoinSet` with one
//! task per job. Jobs for the same environment run one at a time; each one
//! skips itself if the package list moved on since it was submitted, then
//! marks the environment `installing`, builds the venv, and writes the
//! outcome back unless the environment changed or disappeared in the
//! meantime. Every step is published on the event bus.

use std::sync::Arc;

use coderun_core::environment::{packages_changed, InstallState};
use coderun_core::runner::locks::InstallLocks;
use coderun_core::runner::venv::{InstallReport, VenvManager};
use coderun_core::types::DbId;
use coderun_db::models::environment::InstallOutcome;
use coderun_db::{ApplyOutcome, EnvironmentStore};
use coderun_events::bus::{
    EnvironmentEvent, EventBus, INSTALLED, INSTALL_FAILED, INSTALL_STARTED, INSTALL_SUPERSEDED,
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A request to (re)build one environment with a snapshot of its packages.
#[derive(Debug, Clone)]
pub struct InstallJob {
    pub job_id: Uuid,
    pub environment_id: DbId,
    pub packages: Vec<String>,
}

/// Submission side of the supervisor. Cheap to clone.
#[derive(Debug, Clone)]
pub struct InstallQueue {
    sender: mpsc::UnboundedSender<InstallJob>,
}

impl InstallQueue {
    /// Create a queue and the receiver the supervisor consumes.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<InstallJob>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Schedule an install; returns the job id used in events.
    pub fn submit(&self, environment_id: DbId, packages: Vec<String>) -> Uuid {
        let job = InstallJob {
            job_id: Uuid::new_v4(),
            environment_id,
            packages,
        };
        let job_id = job.job_id;
        if self.sender.send(job).is_err() {
            tracing::warn!(
                environment_id,
                %job_id,
                "Install supervisor is not running; job dropped",
            );
        } else {
            tracing::debug!(environment_id, %job_id, "Install job submitted");
        }
        job_id
    }
}

pub struct InstallSupervisor {
    store: Arc<dyn EnvironmentStore>,
    venvs: Arc<VenvManager>,
    event_bus: Arc<EventBus>,
    jobs_in_order: InstallLocks,
}

impl InstallSupervisor {
    pub fn new(
        store: Arc<dyn EnvironmentStore>,
        venvs: Arc<VenvManager>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            venvs,
            event_bus,
            jobs_in_order: InstallLocks::new(),
        }
    }

    /// Consume jobs until `cancel` fires or every queue handle is dropped.
    ///
    /// In-flight installs are aborted on cancellation; their environments
    /// stay `installing` and are picked up by the next startup verification.
    pub async fn run(
        self: Arc<Self>,
        mut jobs: mpsc::UnboundedReceiver<InstallJob>,
        cancel: CancellationToken,
    ) {
        tracing::info!("Install supervisor started");
        let mut tasks: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(in_flight = tasks.len(), "Install supervisor stopping");
                    break;
                }
                job = jobs.recv() => match job {
                    Some(job) => {
                        let this = Arc::clone(&self);
                        tasks.spawn(async move {
                            this.process(job).await;
                        });
                    }
                    None => {
                        tracing::info!("Install queue closed");
                        break;
                    }
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            tracing::error!(error = %e, "Install task panicked");
                        }
                    }
                }
            }
        }

        tasks.shutdown().await;
        tracing::info!("Install supervisor stopped");
    }

    /// Run one job to completion and return how its outcome was applied.
    ///
    /// `None` means the job never started (environment gone or store error).
    pub async fn process(&self, job: InstallJob) -> Option<ApplyOutcome> {
        let id = job.environment_id;
        let _turn = self.jobs_in_order.acquire(id).await;

        let current = match self.store.find_by_id(id).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                tracing::info!(environment_id = id, job_id = %job.job_id, "Environment gone before install started");
                return None;
            }
            Err(e) => {
                tracing::error!(environment_id = id, error = %e, "Failed to load environment for install");
                return None;
            }
        };
        if packages_changed(&current.packages, &job.packages) {
            tracing::info!(environment_id = id, job_id = %job.job_id, "Skipping stale install job");
            self.event_bus.publish(
                EnvironmentEvent::new(INSTALL_SUPERSEDED, id)
                    .with_job(job.job_id)
                    .with_payload(json!({ "reason": "packages_changed" })),
            );
            return Some(ApplyOutcome::Superseded);
        }

        match self.store.mark_installing(id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(environment_id = id, job_id = %job.job_id, "Environment gone before install started");
                return None;
            }
            Err(e) => {
                tracing::error!(environment_id = id, error = %e, "Failed to mark environment installing");
                return None;
            }
        }
        self.event_bus.publish(
            EnvironmentEvent::new(INSTALL_STARTED, id)
                .with_job(job.job_id)
                .with_payload(json!({ "packages": job.packages })),
        );

        let report = self.venvs.create(id, &job.packages).await;
        let outcome = install_outcome(&report);

        let applied = match self
            .store
            .apply_install_outcome(id, &job.packages, &outcome)
            .await
        {
            Ok(applied) => applied,
            Err(e) => {
                tracing::error!(environment_id = id, error = %e, "Failed to record install outcome");
                return None;
            }
        };

        let event = match applied {
            ApplyOutcome::Applied => {
                tracing::info!(
                    environment_id = id,
                    job_id = %job.job_id,
                    success = report.success,
                    "Install outcome recorded",
                );
                let event_type = if report.success { INSTALLED } else { INSTALL_FAILED };
                EnvironmentEvent::new(event_type, id).with_payload(json!({
                    "installPath": outcome.install_path,
                    "error": outcome.install_error,
                    "packageResults": outcome.package_results,
                    "installedPackages": report.installed_packages,
                }))
            }
            ApplyOutcome::Superseded => {
                // The job for the new package list is queued behind this one.
                tracing::info!(environment_id = id, job_id = %job.job_id, "Install superseded by a package change");
                EnvironmentEvent::new(INSTALL_SUPERSEDED, id)
                    .with_payload(json!({ "reason": "packages_changed" }))
            }
            ApplyOutcome::Missing => {
                tracing::info!(environment_id = id, job_id = %job.job_id, "Environment deleted during install");
                self.venvs.delete(id, Some(&report.install_path)).await;
                EnvironmentEvent::new(INSTALL_SUPERSEDED, id)
                    .with_payload(json!({ "reason": "deleted" }))
            }
        };
        self.event_bus.publish(event.with_job(job.job_id));

        Some(applied)
    }
}

fn install_outcome(report: &InstallReport) -> InstallOutcome {
    InstallOutcome {
        state: if report.success {
            InstallState::Installed
        } else {
            InstallState::Failed
        },
        install_path: report
            .success
            .then(|| report.install_path.to_string_lossy().into_owned()),
        install_error: report.error.clone(),
        package_results: report.package_results.clone(),
    }
}
