use std::path::PathBuf;

use coderun_core::runner::pipeline::DEFAULT_COMPILE_TIMEOUT_MS;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `5000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds. Must exceed the longest compile plus
    /// run budget.
    pub request_timeout_secs: u64,
    /// How long shutdown waits for background tasks, in seconds.
    pub shutdown_timeout_secs: u64,
    /// Postgres URL. Without one, environment metadata lives in memory.
    pub database_url: Option<String>,
    /// Root directory for durable Python environments.
    pub python_env_dir: PathBuf,
    /// Python interpreter for ad-hoc runs and venv bootstrap.
    pub python_bin: String,
    /// Budget for compile stages, in milliseconds.
    pub compile_timeout_ms: u64,
    /// Insert the default environments into an empty store at boot.
    pub seed_default_environments: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                               |
    /// |-----------------------------|---------------------------------------|
    /// | `HOST`                      | `0.0.0.0`                             |
    /// | `PORT`                      | `5000`                                |
    /// | `CORS_ORIGINS`              | `http://localhost:3000`               |
    /// | `REQUEST_TIMEOUT_SECS`      | `90`                                  |
    /// | `SHUTDOWN_TIMEOUT_SECS`     | `30`                                  |
    /// | `DATABASE_URL`              | unset (in-memory store)               |
    /// | `PYTHON_ENV_DIR`            | `$HOME/.code-snippets/python-envs`    |
    /// | `PYTHON_BIN`                | `python3`                             |
    /// | `COMPILE_TIMEOUT_MS`        | `30000`                               |
    /// | `SEED_DEFAULT_ENVIRONMENTS` | `true`                                |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "5000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "90".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let python_env_dir = std::env::var("PYTHON_ENV_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_python_env_dir());

        let python_bin = std::env::var("PYTHON_BIN").unwrap_or_else(|_| "python3".into());

        let compile_timeout_ms: u64 = std::env::var("COMPILE_TIMEOUT_MS")
            .map(|v| v.parse().expect("COMPILE_TIMEOUT_MS must be a valid u64"))
            .unwrap_or(DEFAULT_COMPILE_TIMEOUT_MS);

        let seed_default_environments = std::env::var("SEED_DEFAULT_ENVIRONMENTS")
            .map(|v| parse_bool(&v))
            .unwrap_or(true);

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            database_url,
            python_env_dir,
            python_bin,
            compile_timeout_ms,
            seed_default_environments,
        }
    }
}

fn default_python_env_dir() -> PathBuf {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);
    home.join(".code-snippets").join("python-envs")
}

fn parse_bool(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_boolean_flags() {
        assert!(parse_bool("true"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool(" OFF "));
    }

    #[test]
    fn default_env_dir_is_under_code_snippets() {
        assert!(default_python_env_dir().ends_with(".code-snippets/python-envs"));
    }
}
