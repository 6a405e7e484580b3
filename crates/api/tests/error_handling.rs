//! Tests for `AppError` → HTTP response mapping.
//!
//! These call `IntoResponse` directly on `AppError` values; no server needed.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use coderun_api::error::AppError;
use coderun_core::error::CoreError;
use coderun_core::runner::pipeline::StageError;
use coderun_core::runner::RunError;
use coderun_db::DbError;
use http_body_util::BodyExt;

async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

#[tokio::test]
async fn not_found_error_returns_404() {
    let err = AppError::Core(CoreError::NotFound {
        entity: "Python environment",
        id: 42,
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "Python environment not found");
}

#[tokio::test]
async fn validation_error_returns_400_with_details() {
    let err = AppError::Core(CoreError::Validation("Code is required".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "Validation failed");
    assert_eq!(json["details"], "Code is required");
}

#[tokio::test]
async fn environment_not_ready_returns_400() {
    let err = AppError::Core(CoreError::environment_not_ready(
        "Python environment not ready",
        "Environment is still being installed. Please try again later.",
    ));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "ENVIRONMENT_NOT_READY");
    assert_eq!(json["error"], "Python environment not ready");
    assert!(json["details"].as_str().unwrap().contains("try again later"));
}

#[tokio::test]
async fn system_python_unavailable_returns_500() {
    let (status, json) = error_to_response(AppError::Core(CoreError::SystemPythonUnavailable)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "System Python is not available");
    assert_eq!(
        json["details"],
        "Please install Python or select a virtual environment"
    );
}

#[tokio::test]
async fn timeout_reports_limit() {
    let err = AppError::Execution(StageError::Run(RunError::Timeout {
        program: "python3".into(),
        timeout_ms: 1500,
    }));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "EXECUTION_TIMEOUT");
    assert_eq!(json["error"], "Execution timed out");
    assert!(json["details"].as_str().unwrap().contains("1500"));
}

#[tokio::test]
async fn nonzero_exit_keeps_partial_output() {
    let err = AppError::Execution(StageError::Run(RunError::NonZeroExit {
        program: "python3".into(),
        exit_code: 3,
        stdout: "partial\n".into(),
        stderr: "boom\n".into(),
    }));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Execution failed");
    assert_eq!(json["output"], "partial\n");
    assert_eq!(json["stderr"], "boom\n");
    assert!(json["details"].as_str().unwrap().contains("exit code 3"));
}

#[tokio::test]
async fn compile_failure_is_distinguished() {
    let err = AppError::Execution(StageError::Compile(RunError::NonZeroExit {
        program: "rustc".into(),
        exit_code: 1,
        stdout: String::new(),
        stderr: "error[E0425]: cannot find value".into(),
    }));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "COMPILATION_FAILED");
    assert_eq!(json["error"], "Compilation failed");
    assert!(json["stderr"].as_str().unwrap().contains("E0425"));
}

#[tokio::test]
async fn spawn_failure_returns_500() {
    let err = AppError::Execution(StageError::Run(RunError::Spawn {
        program: "swift".into(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    }));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "SPAWN_FAILED");
    assert_eq!(json["error"], "Execution failed to start");
}

#[tokio::test]
async fn storage_error_is_sanitized() {
    let err = AppError::Database(DbError::InvalidValue("secret column detail".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
    assert!(!json.to_string().contains("secret"));
}

#[tokio::test]
async fn internal_error_returns_500_and_sanitizes_message() {
    let err = AppError::InternalError("secret credentials leaked".into());

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert!(!json.to_string().contains("secret"));
}
