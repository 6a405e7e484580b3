//! Storage interface for environment metadata.

use async_trait::async_trait;
use coderun_core::types::DbId;

use crate::error::DbError;
use crate::models::environment::{
    CreatePythonEnvironment, InstallOutcome, PythonEnvironment, UpdatePythonEnvironment,
};

mod memory;
mod postgres;

pub use memory::MemoryEnvironmentStore;
pub use postgres::PgEnvironmentStore;

/// What happened to an install outcome handed to
/// [`EnvironmentStore::apply_install_outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The package list changed while the install ran; the outcome was dropped.
    Superseded,
    /// The environment no longer exists.
    Missing,
}

#[async_trait]
pub trait EnvironmentStore: Send + Sync {
    /// Every environment, sorted by name.
    async fn list(&self) -> Result<Vec<PythonEnvironment>, DbError>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<PythonEnvironment>, DbError>;

    async fn count(&self) -> Result<i64, DbError>;

    async fn create(&self, dto: &CreatePythonEnvironment) -> Result<PythonEnvironment, DbError>;

    /// See [`UpdatePythonEnvironment`] for the reset rule on `packages`.
    async fn update(
        &self,
        id: DbId,
        dto: &UpdatePythonEnvironment,
    ) -> Result<Option<PythonEnvironment>, DbError>;

    /// Remove an environment, returning the row that was removed.
    async fn delete(&self, id: DbId) -> Result<Option<PythonEnvironment>, DbError>;

    async fn mark_installing(&self, id: DbId) -> Result<bool, DbError>;

    async fn reset_install(&self, id: DbId, reason: &str) -> Result<bool, DbError>;

    /// Persist an install outcome if the package list is still
    /// `expected_packages` (order-insensitive).
    async fn apply_install_outcome(
        &self,
        id: DbId,
        expected_packages: &[String],
        outcome: &InstallOutcome,
    ) -> Result<ApplyOutcome, DbError>;

    async fn touch_last_used(&self, id: DbId) -> Result<(), DbError>;

    async fn health_check(&self) -> Result<(), DbError>;

    /// Short backend name for logs and the health endpoint.
    fn backend(&self) -> &'static str;
}
