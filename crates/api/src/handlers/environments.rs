//! Handlers for durable Python environments.
//!
//! Writes only touch metadata and return immediately. Building or
//! rebuilding the environment on disk is handed to the install supervisor.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use coderun_core::environment::{
    normalize_packages, packages_changed, validate_environment_name, validate_packages,
    InstallState, PackageInstallResult,
};
use coderun_core::error::CoreError;
use coderun_core::types::{DbId, Timestamp};
use coderun_db::models::environment::{
    CreatePythonEnvironment, PythonEnvironment, UpdatePythonEnvironment,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

const ENTITY: &str = "Python environment";

/// Wire shape of an environment.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentResponse {
    pub id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub packages: Vec<String>,
    pub created: Timestamp,
    pub last_used: Option<Timestamp>,
    pub is_installed: bool,
    pub install_state: InstallState,
    pub install_path: Option<String>,
    pub install_error: Option<String>,
    pub package_results: Vec<PackageInstallResult>,
}

impl From<PythonEnvironment> for EnvironmentResponse {
    fn from(env: PythonEnvironment) -> Self {
        let install_state = env.install_state();
        let package_results = env.package_results();
        Self {
            id: env.id,
            name: env.name,
            description: env.description,
            packages: env.packages,
            created: env.created_at,
            last_used: env.last_used_at,
            is_installed: install_state == InstallState::Installed,
            install_state,
            install_path: env.install_path,
            install_error: env.install_error,
            package_results,
        }
    }
}

/// POST body. `name` is optional here so a missing name gets the same
/// validation error as a blank one.
#[derive(Debug, Deserialize)]
pub struct CreateEnvironmentRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub packages: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: &'static str,
}

fn not_found(id: DbId) -> AppError {
    AppError::Core(CoreError::NotFound { entity: ENTITY, id })
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

/// GET /api/python-environments
pub async fn list_environments(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let envs = state.store.list().await?;
    let body: Vec<EnvironmentResponse> = envs.into_iter().map(Into::into).collect();
    Ok(Json(body))
}

/// GET /api/python-environments/{id}
pub async fn get_environment(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let env = state.store.find_by_id(id).await?.ok_or_else(|| not_found(id))?;
    Ok(Json(EnvironmentResponse::from(env)))
}

/// POST /api/python-environments
///
/// Stores the environment as `not_installed` and queues its install, even
/// with an empty package list.
pub async fn create_environment(
    State(state): State<AppState>,
    body: Result<Json<CreateEnvironmentRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let input = json_body(body)?;

    let name = input.name.unwrap_or_default();
    validate_environment_name(&name)?;
    let packages = normalize_packages(&input.packages.unwrap_or_default());
    validate_packages(&packages)?;

    let env = state
        .store
        .create(&CreatePythonEnvironment {
            name: name.trim().to_string(),
            description: input.description,
            packages,
        })
        .await?;

    let job_id = state.installs.submit(env.id, env.packages.clone());
    tracing::info!(
        environment_id = env.id,
        name = %env.name,
        packages = env.packages.len(),
        %job_id,
        "Python environment created",
    );

    Ok((StatusCode::CREATED, Json(EnvironmentResponse::from(env))))
}

/// PUT /api/python-environments/{id}
///
/// Absent fields are left unchanged. A package list that differs from the
/// stored one (ignoring order) resets the install and queues a rebuild.
pub async fn update_environment(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    body: Result<Json<UpdatePythonEnvironment>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let input = json_body(body)?;

    if let Some(name) = &input.name {
        validate_environment_name(name)?;
    }
    let current = state.store.find_by_id(id).await?.ok_or_else(|| not_found(id))?;

    let packages = match input.packages {
        Some(requested) => {
            let requested = normalize_packages(&requested);
            validate_packages(&requested)?;
            Some(requested)
        }
        None => None,
    };
    // A reorder is stored but does not change what gets installed.
    let reinstall = packages
        .as_ref()
        .is_some_and(|requested| packages_changed(&current.packages, requested));

    let update = UpdatePythonEnvironment {
        name: input.name.map(|n| n.trim().to_string()),
        description: input.description,
        packages,
        reset_install: reinstall,
    };
    let env = state
        .store
        .update(id, &update)
        .await?
        .ok_or_else(|| not_found(id))?;

    if reinstall {
        let job_id = state.installs.submit(env.id, env.packages.clone());
        tracing::info!(
            environment_id = id,
            packages = env.packages.len(),
            %job_id,
            "Package list changed; reinstall queued",
        );
    } else {
        tracing::info!(environment_id = id, "Python environment updated");
    }

    Ok(Json(EnvironmentResponse::from(env)))
}

/// DELETE /api/python-environments/{id}
///
/// Responds once the metadata is gone. The directory is removed on a
/// detached task, which waits for any install of the same id to finish;
/// an install that finishes after the delete discards its own directory.
pub async fn delete_environment(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let removed = state.store.delete(id).await?.ok_or_else(|| not_found(id))?;

    let venvs = Arc::clone(&state.venvs);
    let install_path = removed.install_path.map(PathBuf::from);
    tokio::spawn(async move {
        venvs.delete(id, install_path.as_deref()).await;
    });

    tracing::info!(environment_id = id, name = %removed.name, "Python environment deleted");

    Ok(Json(DeleteResponse {
        message: "Python environment deleted successfully",
    }))
}
