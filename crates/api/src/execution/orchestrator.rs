//! Execution orchestrator.
//!
//! Decides which interpreter serves a request and hands it to the
//! [`StagePipeline`]. Held in [`AppState`](crate::state::AppState) as an
//! `Arc<ExecutionOrchestrator>`.
//!
//! Python requests take one of two paths:
//! 1. No environment: check the system interpreter, then run with it.
//! 2. Durable environment: look it up, require `installed`, verify the
//!    directory and interpreter on disk (queueing a repair if either is
//!    gone), touch `last_used`, then run with the environment interpreter.
//!
//! This path never creates an environment inline.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use coderun_core::environment::interpreter_path;
use coderun_core::error::CoreError;
use coderun_core::execution::ExecutionRequest;
use coderun_core::language::Language;
use coderun_core::runner::pipeline::{ExecutionOutcome, StagePipeline};
use coderun_core::runner::venv::{verify_install, InstallHealth};
use coderun_core::runner::{run_command, RunOptions};
use coderun_core::types::DbId;
use coderun_db::models::environment::PythonEnvironment;
use coderun_db::EnvironmentStore;
use serde::Serialize;

use crate::background::install_supervisor::InstallQueue;
use crate::error::AppResult;

/// Budget for the `--version` check of the system interpreter.
const PYTHON_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const ENVIRONMENT_ENTITY: &str = "Python environment";

const RETRY_LATER: &str = "Environment is still being installed. Please try again later.";

/// Which Python served a request, echoed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentInfo {
    pub python: bool,
    pub virtual_env: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packages: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub outcome: ExecutionOutcome,
    pub environment: Option<EnvironmentInfo>,
}

pub struct ExecutionOrchestrator {
    pipeline: StagePipeline,
    python_bin: String,
    store: Arc<dyn EnvironmentStore>,
    installs: InstallQueue,
}

impl ExecutionOrchestrator {
    pub fn new(
        pipeline: StagePipeline,
        python_bin: String,
        store: Arc<dyn EnvironmentStore>,
        installs: InstallQueue,
    ) -> Self {
        Self {
            pipeline,
            python_bin,
            store,
            installs,
        }
    }

    pub async fn execute(&self, request: &ExecutionRequest) -> AppResult<ExecutionReport> {
        tracing::info!(
            language = %request.language,
            code_bytes = request.code.len(),
            timeout_ms = request.effective_timeout_ms(),
            environment_id = request.environment_ref,
            "Executing code",
        );

        if request.language != Language::Python {
            let outcome = self.pipeline.execute(request, None).await?;
            return Ok(ExecutionReport {
                outcome,
                environment: None,
            });
        }

        match request.environment_ref {
            None => self.execute_system_python(request).await,
            Some(id) => self.execute_in_environment(request, id).await,
        }
    }

    async fn execute_system_python(&self, request: &ExecutionRequest) -> AppResult<ExecutionReport> {
        self.check_system_python().await?;
        let python = PathBuf::from(&self.python_bin);
        let outcome = self.pipeline.execute(request, Some(&python)).await?;
        Ok(ExecutionReport {
            outcome,
            environment: Some(EnvironmentInfo {
                python: true,
                virtual_env: false,
                name: None,
                packages: None,
            }),
        })
    }

    async fn check_system_python(&self) -> Result<(), CoreError> {
        match run_command(
            &self.python_bin,
            &["--version"],
            RunOptions::with_timeout(PYTHON_PROBE_TIMEOUT),
        )
        .await
        {
            Ok(out) => {
                // Python 2 prints its version on stderr.
                let version = if out.stdout.trim().is_empty() {
                    out.stderr.trim().to_string()
                } else {
                    out.stdout.trim().to_string()
                };
                tracing::debug!(python = %self.python_bin, %version, "System Python available");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(python = %self.python_bin, error = %e, "System Python version check failed");
                Err(CoreError::SystemPythonUnavailable)
            }
        }
    }

    async fn execute_in_environment(
        &self,
        request: &ExecutionRequest,
        id: DbId,
    ) -> AppResult<ExecutionReport> {
        let env = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: ENVIRONMENT_ENTITY,
                id,
            })?;

        let install_path = self.ready_install_path(&env).await?;

        if let Err(e) = self.store.touch_last_used(id).await {
            tracing::warn!(environment_id = id, error = %e, "Failed to update last used time");
        }

        let python = interpreter_path(&install_path);
        tracing::debug!(environment_id = id, python = %python.display(), "Running in environment");
        let outcome = self.pipeline.execute(request, Some(&python)).await?;

        Ok(ExecutionReport {
            outcome,
            environment: Some(EnvironmentInfo {
                python: true,
                virtual_env: true,
                name: Some(env.name),
                packages: Some(env.packages),
            }),
        })
    }

    /// The install directory of a usable environment.
    ///
    /// A directory or interpreter that vanished demotes the environment to
    /// `not_installed` and queues a repair before the request is refused.
    async fn ready_install_path(&self, env: &PythonEnvironment) -> AppResult<PathBuf> {
        let install_path = match (env.is_installed(), env.install_path_buf()) {
            (true, Some(path)) => path,
            _ => {
                let details = env
                    .install_error
                    .clone()
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| RETRY_LATER.to_string());
                return Err(
                    CoreError::environment_not_ready("Python environment not ready", details).into(),
                );
            }
        };

        let health = verify_install(&install_path).await;
        if health.is_healthy() {
            return Ok(install_path);
        }
        self.schedule_repair(env, &install_path, health).await?;

        let (reason, details) = match health {
            InstallHealth::MissingInterpreter => (
                "Python executable not found",
                "The Python executable was not found in the virtual environment. \
                 The environment will be reinstalled. Please try again later.",
            ),
            _ => (
                "Python environment not found",
                "The virtual environment was not found and will be reinstalled. \
                 Please try again later.",
            ),
        };
        Err(CoreError::environment_not_ready(reason, details).into())
    }

    async fn schedule_repair(
        &self,
        env: &PythonEnvironment,
        install_path: &Path,
        health: InstallHealth,
    ) -> AppResult<()> {
        let reason = health
            .diagnostic(install_path)
            .unwrap_or_else(|| "Environment failed verification".to_string());
        tracing::warn!(
            environment_id = env.id,
            path = %install_path.display(),
            reason = %reason,
            "Environment broken on disk; scheduling repair",
        );
        self.store.reset_install(env.id, &reason).await?;
        self.installs.submit(env.id, env.packages.clone());
        Ok(())
    }
}
