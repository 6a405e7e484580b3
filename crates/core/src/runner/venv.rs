//! Durable Python virtual environments.
//!
//! Each environment id owns exactly one directory, `<base_dir>/env_<id>`.
//! [`VenvManager::create`] always rebuilds that directory from scratch:
//! bootstrap the venv, upgrade pip, install every declared package on its
//! own, then record what pip reports as installed. Only a bootstrap failure
//! fails the whole install; package failures are reported individually.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::environment::{install_dir, interpreter_path, sanitize_package, PackageInstallResult};
use crate::runner::locks::InstallLocks;
use crate::runner::subprocess::{run_command, RunOptions};
use crate::types::DbId;

/// Time budgets for each step of an install.
#[derive(Debug, Clone)]
pub struct VenvTimeouts {
    pub create: Duration,
    pub pip_upgrade: Duration,
    pub package_install: Duration,
    pub freeze: Duration,
}

impl Default for VenvTimeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(60),
            pip_upgrade: Duration::from_secs(120),
            package_install: Duration::from_secs(180),
            freeze: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VenvConfig {
    /// Root directory under which every environment directory lives.
    pub base_dir: PathBuf,
    /// Interpreter used to bootstrap new environments.
    pub python_bin: String,
    pub timeouts: VenvTimeouts,
}

/// Result of one [`VenvManager::create`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub success: bool,
    pub install_path: PathBuf,
    pub error: Option<String>,
    pub package_results: Vec<PackageInstallResult>,
    /// `pip freeze` lines, empty when the freeze step failed.
    pub installed_packages: Vec<String>,
}

/// Why an install directory cannot serve requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallHealth {
    Healthy,
    MissingDirectory,
    MissingInterpreter,
}

impl InstallHealth {
    pub fn is_healthy(self) -> bool {
        self == InstallHealth::Healthy
    }

    /// Diagnostic persisted as the environment's install error.
    pub fn diagnostic(self, path: &Path) -> Option<String> {
        match self {
            InstallHealth::Healthy => None,
            InstallHealth::MissingDirectory => Some(format!(
                "Environment directory {} does not exist",
                path.display()
            )),
            InstallHealth::MissingInterpreter => Some(format!(
                "Python interpreter not found at {}",
                interpreter_path(path).display()
            )),
        }
    }
}

/// Check that an install directory and its interpreter are present.
pub async fn verify_install(path: &Path) -> InstallHealth {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return InstallHealth::MissingDirectory;
    }
    if !tokio::fs::try_exists(interpreter_path(path))
        .await
        .unwrap_or(false)
    {
        return InstallHealth::MissingInterpreter;
    }
    InstallHealth::Healthy
}

#[derive(Debug, Clone)]
pub struct VenvManager {
    config: VenvConfig,
    locks: InstallLocks,
}

impl VenvManager {
    pub fn new(config: VenvConfig) -> Self {
        Self {
            config,
            locks: InstallLocks::new(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.config.base_dir
    }

    pub fn python_bin(&self) -> &str {
        &self.config.python_bin
    }

    /// Directory an environment id installs into.
    pub fn install_path(&self, id: DbId) -> PathBuf {
        install_dir(&self.config.base_dir, id)
    }

    /// Build (or rebuild) the environment for `id` with `packages`.
    pub async fn create(&self, id: DbId, packages: &[String]) -> InstallReport {
        let _guard = self.locks.acquire(id).await;
        let path = self.install_path(id);

        tracing::info!(
            environment_id = id,
            path = %path.display(),
            package_count = packages.len(),
            "Creating Python environment",
        );

        if let Err(error) = self.bootstrap(&path).await {
            tracing::error!(environment_id = id, error = %error, "Environment bootstrap failed");
            remove_dir(id, &path).await;
            return InstallReport {
                success: false,
                install_path: path,
                error: Some(error),
                package_results: Vec::new(),
                installed_packages: Vec::new(),
            };
        }

        let python = interpreter_path(&path);

        if let Err(e) = run_command(
            &python,
            &["-m", "pip", "install", "--upgrade", "pip"],
            RunOptions::with_timeout(self.config.timeouts.pip_upgrade),
        )
        .await
        {
            tracing::warn!(environment_id = id, error = %e.diagnostic(), "pip upgrade failed");
        }

        let mut package_results = Vec::with_capacity(packages.len());
        for spec in packages {
            package_results.push(self.install_package(id, &python, spec).await);
        }

        let installed_packages = match run_command(
            &python,
            &["-m", "pip", "freeze"],
            RunOptions::with_timeout(self.config.timeouts.freeze),
        )
        .await
        {
            Ok(out) => out
                .stdout
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) => {
                tracing::warn!(environment_id = id, error = %e.diagnostic(), "pip freeze failed");
                Vec::new()
            }
        };

        let failed = package_results.iter().filter(|r| !r.success).count();
        tracing::info!(
            environment_id = id,
            installed = package_results.len() - failed,
            failed,
            "Python environment ready",
        );

        InstallReport {
            success: true,
            install_path: path,
            error: None,
            package_results,
            installed_packages,
        }
    }

    /// Remove an environment directory. Missing directories are a no-op and
    /// removal errors are logged, never returned.
    ///
    /// `path` defaults to the deterministic install path for `id`.
    pub async fn delete(&self, id: DbId, path: Option<&Path>) {
        let _guard = self.locks.acquire(id).await;
        let target = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.install_path(id));

        if !target.starts_with(&self.config.base_dir) {
            tracing::warn!(
                environment_id = id,
                path = %target.display(),
                "Refusing to remove a directory outside the environments root",
            );
            return;
        }
        remove_dir(id, &target).await;
    }

    /// Fresh directory plus a working interpreter.
    async fn bootstrap(&self, path: &Path) -> Result<(), String> {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(path)
                .await
                .map_err(|e| format!("Failed to remove stale environment directory: {e}"))?;
        }
        tokio::fs::create_dir_all(&self.config.base_dir)
            .await
            .map_err(|e| format!("Failed to create environments directory: {e}"))?;

        let path_arg = path.as_os_str();
        run_command(
            &self.config.python_bin,
            &[std::ffi::OsStr::new("-m"), std::ffi::OsStr::new("venv"), path_arg],
            RunOptions::with_timeout(self.config.timeouts.create),
        )
        .await
        .map_err(|e| format!("Failed to create Python virtual environment: {}", e.diagnostic()))?;

        match verify_install(path).await {
            InstallHealth::Healthy => Ok(()),
            health => Err(health
                .diagnostic(path)
                .unwrap_or_else(|| "Virtual environment is incomplete".to_string())),
        }
    }

    async fn install_package(&self, id: DbId, python: &Path, spec: &str) -> PackageInstallResult {
        let Some(package) = sanitize_package(spec) else {
            tracing::warn!(environment_id = id, spec, "Skipping invalid package specifier");
            return PackageInstallResult {
                package: spec.to_string(),
                success: false,
                detail: Some("Invalid package specifier".to_string()),
            };
        };

        tracing::debug!(environment_id = id, package = %package, "Installing package");
        match run_command(
            python,
            &["-m", "pip", "install", package.as_str()],
            RunOptions::with_timeout(self.config.timeouts.package_install),
        )
        .await
        {
            Ok(_) => PackageInstallResult {
                package,
                success: true,
                detail: None,
            },
            Err(e) => {
                let detail = e.diagnostic();
                tracing::warn!(environment_id = id, package = %package, error = %detail, "Package install failed");
                PackageInstallResult {
                    package,
                    success: false,
                    detail: Some(detail),
                }
            }
        }
    }
}

async fn remove_dir(id: DbId, path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {
            tracing::info!(environment_id = id, path = %path.display(), "Removed environment directory");
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(
                environment_id = id,
                path = %path.display(),
                error = %e,
                "Failed to remove environment directory",
            );
        }
    }
}
