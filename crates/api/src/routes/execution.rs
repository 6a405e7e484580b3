use axum::routing::post;
use axum::Router;

use crate::handlers::execution;
use crate::state::AppState;

/// Execution route mounted under `/api`.
///
/// ```text
/// POST /execute  -> execute
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/execute", post(execution::execute))
}
