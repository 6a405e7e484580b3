use crate::types::DbId;

/// Domain-level failures shared by the execution and environment layers.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// The referenced environment exists but cannot serve requests yet.
    ///
    /// `reason` is the short headline returned as `error`, `details` tells
    /// the caller what happens next (usually "retry later").
    #[error("{reason}: {details}")]
    EnvironmentNotReady { reason: String, details: String },

    #[error("System Python is not available")]
    SystemPythonUnavailable,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn environment_not_ready(reason: impl Into<String>, details: impl Into<String>) -> Self {
        Self::EnvironmentNotReady {
            reason: reason.into(),
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_not_found() {
        let err = CoreError::NotFound {
            entity: "PythonEnvironment",
            id: 7,
        };
        assert_eq!(
            err.to_string(),
            "Entity not found: PythonEnvironment with id 7"
        );
    }

    #[test]
    fn display_environment_not_ready() {
        let err = CoreError::environment_not_ready(
            "Python environment not ready",
            "Environment is still being installed. Please try again later.",
        );
        assert!(err.to_string().starts_with("Python environment not ready: "));
    }
}
