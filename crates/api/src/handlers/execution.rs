//! Handler for running a code snippet.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use coderun_core::execution::{ExecutionRequest, RawExecutionRequest};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::execution::EnvironmentInfo;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub success: bool,
    pub output: String,
    pub stderr: String,
    pub execution_time: u64,
    /// Set when stdout or stderr hit the capture limit.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentInfo>,
}

/// POST /api/execute
///
/// Malformed JSON is a 400; every other failure is mapped by [`AppError`].
pub async fn execute(
    State(state): State<AppState>,
    body: Result<Json<RawExecutionRequest>, JsonRejection>,
) -> AppResult<Json<ExecuteResponse>> {
    let Json(raw) = body.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    let request = ExecutionRequest::from_raw(raw)?;

    let report = state.orchestrator.execute(&request).await?;

    tracing::info!(
        language = %request.language,
        execution_time_ms = report.outcome.execution_time_ms,
        truncated = report.outcome.truncated,
        "Execution finished",
    );

    Ok(Json(ExecuteResponse {
        success: true,
        output: report.outcome.stdout,
        stderr: report.outcome.stderr,
        execution_time: report.outcome.execution_time_ms,
        truncated: report.outcome.truncated,
        environment: report.environment,
    }))
}
