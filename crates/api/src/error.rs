use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use coderun_core::error::CoreError;
use coderun_core::runner::pipeline::StageError;
use coderun_core::runner::RunError;
use coderun_db::DbError;
use serde::Serialize;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors, [`StageError`] for failed
/// executions, and [`DbError`] for storage failures. Implements
/// [`IntoResponse`] so every failure leaves as the same JSON envelope.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Execution(#[from] StageError),

    #[error(transparent)]
    Database(#[from] DbError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Partial stdout of a program that failed after it started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl ErrorBody {
    fn new(error: impl Into<String>, code: &'static str) -> Self {
        Self {
            success: false,
            error: error.into(),
            code,
            details: None,
            output: None,
            stderr: None,
        }
    }

    fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    fn captured(mut self, stdout: &str, stderr: &str) -> Self {
        self.output = Some(stdout.to_string());
        self.stderr = Some(stderr.to_string());
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    ErrorBody::new(format!("{entity} not found"), "NOT_FOUND")
                        .details(format!("No {entity} with id {id}")),
                ),
                CoreError::Validation(msg) => (
                    StatusCode::BAD_REQUEST,
                    ErrorBody::new("Validation failed", "VALIDATION_ERROR").details(msg.clone()),
                ),
                CoreError::EnvironmentNotReady { reason, details } => (
                    StatusCode::BAD_REQUEST,
                    ErrorBody::new(reason.clone(), "ENVIRONMENT_NOT_READY").details(details.clone()),
                ),
                CoreError::SystemPythonUnavailable => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new(core.to_string(), "PYTHON_UNAVAILABLE")
                        .details("Please install Python or select a virtual environment"),
                ),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ErrorBody::new("An internal error occurred", "INTERNAL_ERROR"),
                    )
                }
            },

            // --- Execution failures ---
            AppError::Execution(stage) => classify_stage_error(stage),

            // --- Storage ---
            AppError::Database(err) => {
                tracing::error!(error = %err, "Storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("An internal error occurred", "INTERNAL_ERROR"),
                )
            }

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody::new("Bad request", "BAD_REQUEST").details(msg.clone()),
            ),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("An internal error occurred", "INTERNAL_ERROR"),
                )
            }
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Map a failed pipeline run to a status and body.
///
/// Every execution failure is a 500; the body tells a compile failure, a
/// timeout, and a crashed program apart.
fn classify_stage_error(err: &StageError) -> (StatusCode, ErrorBody) {
    let body = match err {
        StageError::Staging(io) => {
            tracing::error!(error = %io, "Failed to stage source");
            ErrorBody::new("Execution failed", "EXECUTION_FAILED")
                .details("Failed to prepare the source file")
        }
        StageError::Compile(run) => {
            let body = ErrorBody::new("Compilation failed", "COMPILATION_FAILED")
                .details(run.diagnostic());
            match run {
                RunError::NonZeroExit { stdout, stderr, .. } => body.captured(stdout, stderr),
                _ => body,
            }
        }
        StageError::Run(RunError::Timeout { timeout_ms, .. }) => {
            ErrorBody::new("Execution timed out", "EXECUTION_TIMEOUT")
                .details(format!("Execution exceeded the {timeout_ms}ms time limit"))
        }
        StageError::Run(run @ RunError::NonZeroExit { stdout, stderr, .. }) => {
            ErrorBody::new("Execution failed", "EXECUTION_FAILED")
                .details(run.diagnostic())
                .captured(stdout, stderr)
        }
        StageError::Run(run @ RunError::Spawn { .. }) => {
            ErrorBody::new("Execution failed to start", "SPAWN_FAILED").details(run.to_string())
        }
        StageError::Run(run @ RunError::Wait { .. }) => {
            tracing::error!(error = %run, "Failed to wait for program");
            ErrorBody::new("Execution failed", "EXECUTION_FAILED").details(run.to_string())
        }
    };
    (StatusCode::INTERNAL_SERVER_ERROR, body)
}
