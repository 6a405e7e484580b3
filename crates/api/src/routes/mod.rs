pub mod environments;
pub mod execution;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// ```text
/// /execute                          run a snippet (POST)
///
/// /python-environments              list, create
/// /python-environments/{id}         get, update, delete
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(execution::router())
        .nest("/python-environments", environments::router())
}
