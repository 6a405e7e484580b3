//! Persistence for Python environment metadata.
//!
//! [`EnvironmentStore`] is the interface the service talks to. It is backed
//! by Postgres ([`PgEnvironmentStore`] over [`EnvironmentRepo`]) when a
//! database is configured, and by [`MemoryEnvironmentStore`] otherwise.

use sqlx::postgres::PgPoolOptions;

pub mod error;
pub mod models;
pub mod repositories;
pub mod store;

pub use error::DbError;
pub use repositories::EnvironmentRepo;
pub use store::{ApplyOutcome, EnvironmentStore, MemoryEnvironmentStore, PgEnvironmentStore};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to prove the pool can reach the database.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply every pending migration under `db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../db/migrations").run(pool).await
}
