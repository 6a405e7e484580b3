//! Python environment models and DTOs.

use std::path::PathBuf;

use coderun_core::environment::{InstallState, PackageInstallResult};
use coderun_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Entity structs (database rows)
// ---------------------------------------------------------------------------

/// A row from the `python_environments` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct PythonEnvironment {
    pub id: DbId,
    pub name: String,
    pub description: Option<String>,
    /// Desired package specifiers, in declaration order.
    pub packages: Vec<String>,
    pub install_state_id: i16,
    /// Set only once an install directory has been created.
    pub install_path: Option<String>,
    pub install_error: Option<String>,
    /// JSON array of [`PackageInstallResult`] from the most recent install.
    pub package_results: serde_json::Value,
    pub last_used_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl PythonEnvironment {
    /// Decoded install state. Unknown ids read as `NotInstalled` so the
    /// environment is reinstalled rather than trusted.
    pub fn install_state(&self) -> InstallState {
        InstallState::from_id(self.install_state_id).unwrap_or_else(|| {
            tracing::warn!(
                environment_id = self.id,
                install_state_id = self.install_state_id,
                "Unknown install state id",
            );
            InstallState::NotInstalled
        })
    }

    pub fn is_installed(&self) -> bool {
        self.install_state() == InstallState::Installed
    }

    pub fn install_path_buf(&self) -> Option<PathBuf> {
        self.install_path.as_deref().map(PathBuf::from)
    }

    pub fn package_results(&self) -> Vec<PackageInstallResult> {
        serde_json::from_value(self.package_results.clone()).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// DTO for creating a new environment. Always starts `not_installed`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePythonEnvironment {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub packages: Vec<String>,
}

/// DTO for partially updating an environment.
///
/// `packages` is stored as given, including its order. The install is only
/// reset (state back to `not_installed`, diagnostics cleared) when
/// `reset_install` is set, which the caller does when the package set
/// actually changed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePythonEnvironment {
    pub name: Option<String>,
    pub description: Option<String>,
    pub packages: Option<Vec<String>>,
    #[serde(skip)]
    pub reset_install: bool,
}

/// Terminal result of an install, written back by the install supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub state: InstallState,
    pub install_path: Option<String>,
    pub install_error: Option<String>,
    pub package_results: Vec<PackageInstallResult>,
}

impl InstallOutcome {
    pub fn package_results_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.package_results)
            .unwrap_or_else(|_| serde_json::Value::Array(Vec::new()))
    }
}
