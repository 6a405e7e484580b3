use async_trait::async_trait;
use coderun_core::types::DbId;

use crate::error::DbError;
use crate::models::environment::{
    CreatePythonEnvironment, InstallOutcome, PythonEnvironment, UpdatePythonEnvironment,
};
use crate::repositories::EnvironmentRepo;
use crate::store::{ApplyOutcome, EnvironmentStore};
use crate::DbPool;

/// [`EnvironmentStore`] over a Postgres pool.
#[derive(Clone)]
pub struct PgEnvironmentStore {
    pool: DbPool,
}

impl PgEnvironmentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl EnvironmentStore for PgEnvironmentStore {
    async fn list(&self) -> Result<Vec<PythonEnvironment>, DbError> {
        Ok(EnvironmentRepo::list(&self.pool).await?)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<PythonEnvironment>, DbError> {
        Ok(EnvironmentRepo::find_by_id(&self.pool, id).await?)
    }

    async fn count(&self) -> Result<i64, DbError> {
        Ok(EnvironmentRepo::count(&self.pool).await?)
    }

    async fn create(&self, dto: &CreatePythonEnvironment) -> Result<PythonEnvironment, DbError> {
        Ok(EnvironmentRepo::create(&self.pool, dto).await?)
    }

    async fn update(
        &self,
        id: DbId,
        dto: &UpdatePythonEnvironment,
    ) -> Result<Option<PythonEnvironment>, DbError> {
        Ok(EnvironmentRepo::update(&self.pool, id, dto).await?)
    }

    async fn delete(&self, id: DbId) -> Result<Option<PythonEnvironment>, DbError> {
        Ok(EnvironmentRepo::delete(&self.pool, id).await?)
    }

    async fn mark_installing(&self, id: DbId) -> Result<bool, DbError> {
        Ok(EnvironmentRepo::mark_installing(&self.pool, id).await?)
    }

    async fn reset_install(&self, id: DbId, reason: &str) -> Result<bool, DbError> {
        Ok(EnvironmentRepo::reset_install(&self.pool, id, reason).await?)
    }

    async fn apply_install_outcome(
        &self,
        id: DbId,
        expected_packages: &[String],
        outcome: &InstallOutcome,
    ) -> Result<ApplyOutcome, DbError> {
        if EnvironmentRepo::apply_install_outcome(&self.pool, id, expected_packages, outcome).await? {
            return Ok(ApplyOutcome::Applied);
        }
        // Nothing matched: tell a deleted row apart from a changed package list.
        match EnvironmentRepo::find_by_id(&self.pool, id).await? {
            Some(_) => Ok(ApplyOutcome::Superseded),
            None => Ok(ApplyOutcome::Missing),
        }
    }

    async fn touch_last_used(&self, id: DbId) -> Result<(), DbError> {
        Ok(EnvironmentRepo::touch_last_used(&self.pool, id).await?)
    }

    async fn health_check(&self) -> Result<(), DbError> {
        Ok(crate::health_check(&self.pool).await?)
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
