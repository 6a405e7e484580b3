//! One-shot reconciliation of stored environments with the filesystem.
//!
//! Runs once after the store is reachable. Seeds the default environments
//! into an empty store, demotes `installed` environments whose directory or
//! interpreter is gone, and queues an install for everything that is not
//! installed. It never waits for those installs to finish.

use coderun_core::environment::{InstallState, DEFAULT_ENVIRONMENTS};
use coderun_core::language::Language;
use coderun_core::runner::venv::verify_install;
use coderun_db::models::environment::CreatePythonEnvironment;
use coderun_db::{DbError, EnvironmentStore};

use crate::background::install_supervisor::InstallQueue;

/// What one verification pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifySummary {
    pub seeded: usize,
    pub healthy: usize,
    pub repaired: usize,
    pub queued: usize,
}

pub async fn run(
    store: &dyn EnvironmentStore,
    installs: &InstallQueue,
    seed_defaults: bool,
) -> Result<VerifySummary, DbError> {
    let mut summary = VerifySummary::default();

    if seed_defaults && store.count().await? == 0 {
        for default in DEFAULT_ENVIRONMENTS {
            store
                .create(&CreatePythonEnvironment {
                    name: default.name.to_string(),
                    description: Some(default.description.to_string()),
                    packages: default.packages.iter().map(|p| p.to_string()).collect(),
                })
                .await?;
            summary.seeded += 1;
        }
        tracing::info!(count = summary.seeded, "Seeded default Python environments");
    }

    for env in store.list().await? {
        if env.install_state() == InstallState::Installed {
            let health = match env.install_path_buf() {
                Some(path) => verify_install(&path).await.diagnostic(&path),
                None => Some("Install path was never recorded".to_string()),
            };
            let Some(reason) = health else {
                summary.healthy += 1;
                continue;
            };
            tracing::warn!(
                environment_id = env.id,
                name = %env.name,
                reason = %reason,
                "Installed environment failed verification; reinstalling",
            );
            store.reset_install(env.id, &reason).await?;
            summary.repaired += 1;
        } else {
            tracing::info!(
                environment_id = env.id,
                name = %env.name,
                state = ?env.install_state(),
                "Queueing install for environment",
            );
        }
        installs.submit(env.id, env.packages.clone());
        summary.queued += 1;
    }

    tracing::info!(
        seeded = summary.seeded,
        healthy = summary.healthy,
        repaired = summary.repaired,
        queued = summary.queued,
        "Environment verification complete",
    );
    Ok(summary)
}

/// Log which language toolchains are reachable on `PATH`.
///
/// Missing toolchains are not fatal; requests for those languages fail at
/// spawn time with a clear error. Returns the languages whose toolchain was
/// not found.
pub fn log_toolchains(python_bin: &str) -> Vec<Language> {
    let mut missing = Vec::new();
    for language in Language::all_variants() {
        let binary = match language {
            Language::Python => python_bin,
            other => other.toolchain_binary(),
        };
        match which::which(binary) {
            Ok(path) => {
                tracing::info!(%language, binary, path = %path.display(), "Toolchain available");
            }
            Err(e) => {
                tracing::warn!(%language, binary, error = %e, "Toolchain not found on PATH");
                missing.push(*language);
            }
        }
    }
    missing
}
