//! Repository for the `python_environments` table.

use coderun_core::environment::InstallState;
use coderun_core::types::DbId;
use sqlx::PgPool;

use crate::models::environment::{
    CreatePythonEnvironment, InstallOutcome, PythonEnvironment, UpdatePythonEnvironment,
};

/// Column list for `python_environments` queries.
const COLUMNS: &str = "\
    id, name, description, packages, install_state_id, install_path, \
    install_error, package_results, last_used_at, created_at, updated_at";

/// Order-insensitive comparison of the stored package list with `$2`.
const PACKAGES_MATCH: &str = "\
    (SELECT COALESCE(array_agg(p ORDER BY p), '{}') FROM unnest(packages) AS p) = \
    (SELECT COALESCE(array_agg(p ORDER BY p), '{}') FROM unnest($2::text[]) AS p)";

/// Provides data access for Python environments.
pub struct EnvironmentRepo;

impl EnvironmentRepo {
    /// List every environment, sorted by name.
    pub async fn list(pool: &PgPool) -> Result<Vec<PythonEnvironment>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM python_environments ORDER BY name, id");
        sqlx::query_as::<_, PythonEnvironment>(&query)
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<PythonEnvironment>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM python_environments WHERE id = $1");
        sqlx::query_as::<_, PythonEnvironment>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM python_environments")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    /// Insert a new environment in the `not_installed` state.
    pub async fn create(
        pool: &PgPool,
        dto: &CreatePythonEnvironment,
    ) -> Result<PythonEnvironment, sqlx::Error> {
        let query = format!(
            "INSERT INTO python_environments (name, description, packages, install_state_id) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PythonEnvironment>(&query)
            .bind(&dto.name)
            .bind(&dto.description)
            .bind(&dto.packages)
            .bind(InstallState::NotInstalled.id())
            .fetch_one(pool)
            .await
    }

    /// Partially update an environment.
    ///
    /// Uses `COALESCE` so only provided fields are changed. A new package
    /// list resets the install state and diagnostics; `install_path` is kept
    /// until the next install replaces the directory.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        dto: &UpdatePythonEnvironment,
    ) -> Result<Option<PythonEnvironment>, sqlx::Error> {
        let query = format!(
            "UPDATE python_environments SET \
                 name = COALESCE($2, name), \
                 description = COALESCE($3, description), \
                 packages = COALESCE($4, packages), \
                 install_state_id = CASE WHEN $6 THEN $5 ELSE install_state_id END, \
                 install_error = CASE WHEN $6 THEN NULL ELSE install_error END, \
                 package_results = CASE WHEN $6 THEN '[]'::jsonb ELSE package_results END \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PythonEnvironment>(&query)
            .bind(id)
            .bind(&dto.name)
            .bind(&dto.description)
            .bind(&dto.packages)
            .bind(InstallState::NotInstalled.id())
            .bind(dto.reset_install)
            .fetch_optional(pool)
            .await
    }

    /// Delete an environment, returning the removed row.
    pub async fn delete(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<PythonEnvironment>, sqlx::Error> {
        let query = format!("DELETE FROM python_environments WHERE id = $1 RETURNING {COLUMNS}");
        sqlx::query_as::<_, PythonEnvironment>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Move an environment into `installing`, clearing the last diagnostic.
    pub async fn mark_installing(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE python_environments \
             SET install_state_id = $2, install_error = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .bind(InstallState::Installing.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop an install whose directory is gone: back to `not_installed`
    /// with `reason` recorded and no install path.
    pub async fn reset_install(
        pool: &PgPool,
        id: DbId,
        reason: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE python_environments \
             SET install_state_id = $2, install_path = NULL, install_error = $3 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(InstallState::NotInstalled.id())
        .bind(reason)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Write an install outcome, but only if the stored package list still
    /// matches `expected_packages`.
    ///
    /// Returns `false` when no row matched (deleted or superseded).
    pub async fn apply_install_outcome(
        pool: &PgPool,
        id: DbId,
        expected_packages: &[String],
        outcome: &InstallOutcome,
    ) -> Result<bool, sqlx::Error> {
        let query = format!(
            "UPDATE python_environments SET \
                 install_state_id = $3, \
                 install_path = $4, \
                 install_error = $5, \
                 package_results = $6 \
             WHERE id = $1 AND {PACKAGES_MATCH}"
        );
        let result = sqlx::query(&query)
            .bind(id)
            .bind(expected_packages)
            .bind(outcome.state.id())
            .bind(&outcome.install_path)
            .bind(&outcome.install_error)
            .bind(outcome.package_results_json())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn touch_last_used(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE python_environments SET last_used_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
