//! Route definitions for durable Python environments.

use axum::routing::get;
use axum::Router;

use crate::handlers::environments;
use crate::state::AppState;

/// Environment routes mounted at `/api/python-environments`.
///
/// ```text
/// GET    /       -> list_environments
/// POST   /       -> create_environment
/// GET    /{id}   -> get_environment
/// PUT    /{id}   -> update_environment
/// DELETE /{id}   -> delete_environment
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(environments::list_environments).post(environments::create_environment),
        )
        .route(
            "/{id}",
            get(environments::get_environment)
                .put(environments::update_environment)
                .delete(environments::delete_environment),
        )
}
