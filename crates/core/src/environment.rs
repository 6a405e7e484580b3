//! Durable Python environment domain rules (install state machine, package
//! specifier handling, on-disk layout).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

/// Maximum length of an environment name.
const MAX_NAME_LEN: usize = 128;

/// Maximum number of packages declared by one environment.
const MAX_PACKAGES: usize = 100;

/// Maximum length of a single package specifier.
const MAX_PACKAGE_LEN: usize = 200;

/// Shell control characters stripped from package specifiers.
///
/// pip is spawned without a shell, so version operators (`>=`, `!=`) and
/// extras (`pkg[extra]`) are kept intact.
const FORBIDDEN_SPECIFIER_CHARS: &[char] = &[';', '&', '|', '`', '$', '(', ')', '{', '}', '\\'];

// ---------------------------------------------------------------------------
// Install state machine
// ---------------------------------------------------------------------------

/// `NotInstalled -> Installing -> {Installed | Failed}`.
///
/// Persisted as a SMALLINT; the ids must match the CHECK constraint in the
/// `python_environments` migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallState {
    NotInstalled,
    Installing,
    Installed,
    Failed,
}

impl InstallState {
    pub const fn id(self) -> i16 {
        match self {
            InstallState::NotInstalled => 1,
            InstallState::Installing => 2,
            InstallState::Installed => 3,
            InstallState::Failed => 4,
        }
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(InstallState::NotInstalled),
            2 => Some(InstallState::Installing),
            3 => Some(InstallState::Installed),
            4 => Some(InstallState::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, InstallState::Installed | InstallState::Failed)
    }
}

// ---------------------------------------------------------------------------
// Install diagnostics
// ---------------------------------------------------------------------------

/// Outcome of installing one package specifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInstallResult {
    pub package: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Deterministic install directory for an environment id.
pub fn install_dir(base_dir: &Path, id: DbId) -> PathBuf {
    base_dir.join(format!("env_{id}"))
}

/// Interpreter binary inside an install directory.
pub fn interpreter_path(install_path: &Path) -> PathBuf {
    if cfg!(windows) {
        install_path.join("Scripts").join("python.exe")
    } else {
        install_path.join("bin").join("python")
    }
}

// ---------------------------------------------------------------------------
// Packages
// ---------------------------------------------------------------------------

/// Strip shell metacharacters and surrounding whitespace from a specifier.
///
/// Returns `None` when nothing installable is left, or when the specifier
/// would be read by pip as an option.
pub fn sanitize_package(spec: &str) -> Option<String> {
    let cleaned: String = spec
        .chars()
        .filter(|c| !FORBIDDEN_SPECIFIER_CHARS.contains(c))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned.starts_with('-') {
        return None;
    }
    Some(cleaned.to_string())
}

/// Trim specifiers and drop blank entries, keeping the declared order.
pub fn normalize_packages(packages: &[String]) -> Vec<String> {
    packages
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether two package lists describe the same desired state.
///
/// Order does not matter; duplicates do.
pub fn packages_changed(current: &[String], requested: &[String]) -> bool {
    let mut a: Vec<&str> = current.iter().map(|p| p.trim()).collect();
    let mut b: Vec<&str> = requested.iter().map(|p| p.trim()).collect();
    a.sort_unstable();
    b.sort_unstable();
    a != b
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub fn validate_environment_name(name: &str) -> Result<(), CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::Validation(
            "Environment name is required".to_string(),
        ));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "Environment name must not exceed {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_packages(packages: &[String]) -> Result<(), CoreError> {
    if packages.len() > MAX_PACKAGES {
        return Err(CoreError::Validation(format!(
            "An environment may declare at most {MAX_PACKAGES} packages"
        )));
    }
    if let Some(long) = packages.iter().find(|p| p.len() > MAX_PACKAGE_LEN) {
        return Err(CoreError::Validation(format!(
            "Package specifier '{}...' exceeds {MAX_PACKAGE_LEN} characters",
            long.chars().take(32).collect::<String>()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// An environment inserted into an empty store at first boot.
#[derive(Debug, Clone)]
pub struct DefaultEnvironment {
    pub name: &'static str,
    pub description: &'static str,
    pub packages: &'static [&'static str],
}

pub const DEFAULT_ENVIRONMENTS: &[DefaultEnvironment] = &[
    DefaultEnvironment {
        name: "gen_ai",
        description: "Environment for AI/ML development",
        packages: &["numpy", "pandas", "matplotlib", "langchain", "openai"],
    },
    DefaultEnvironment {
        name: "web_dev",
        description: "Environment for web development",
        packages: &["flask", "django", "fastapi", "sqlalchemy"],
    },
    DefaultEnvironment {
        name: "data_science",
        description: "Environment for data science",
        packages: &[
            "pandas",
            "numpy",
            "scipy",
            "scikit-learn",
            "matplotlib",
            "seaborn",
        ],
    },
];
