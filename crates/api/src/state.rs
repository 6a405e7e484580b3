use std::sync::Arc;

use coderun_core::runner::venv::VenvManager;
use coderun_db::EnvironmentStore;
use coderun_events::EventBus;

use crate::background::install_supervisor::InstallQueue;
use crate::config::ServerConfig;
use crate::execution::ExecutionOrchestrator;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Environment metadata (Postgres or in-memory).
    pub store: Arc<dyn EnvironmentStore>,
    /// Owner of the on-disk environment directories.
    pub venvs: Arc<VenvManager>,
    pub orchestrator: Arc<ExecutionOrchestrator>,
    /// Submission side of the install supervisor.
    pub installs: InstallQueue,
    pub event_bus: Arc<EventBus>,
}
