#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;

use coderun_api::background::install_supervisor::{InstallJob, InstallQueue};
use coderun_api::config::ServerConfig;
use coderun_api::execution::ExecutionOrchestrator;
use coderun_api::router::build_app_router;
use coderun_api::state::AppState;
use coderun_core::runner::pipeline::StagePipeline;
use coderun_core::runner::venv::{VenvConfig, VenvManager, VenvTimeouts};
use coderun_db::{EnvironmentStore, MemoryEnvironmentStore};
use coderun_events::EventBus;

/// A router over an in-memory store, plus the handles tests inspect.
///
/// No install supervisor runs; submitted jobs pile up in `jobs`.
pub struct TestContext {
    pub app: Router,
    pub store: Arc<MemoryEnvironmentStore>,
    pub venvs: Arc<VenvManager>,
    pub jobs: mpsc::UnboundedReceiver<InstallJob>,
    pub env_dir: TempDir,
}

impl TestContext {
    /// A fresh clone of the router for one `oneshot` call.
    pub fn app(&self) -> Router {
        self.app.clone()
    }

    /// Drain the jobs submitted so far.
    pub fn submitted_jobs(&mut self) -> Vec<InstallJob> {
        let mut jobs = Vec::new();
        while let Ok(job) = self.jobs.try_recv() {
            jobs.push(job);
        }
        jobs
    }
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config(env_dir: &TempDir) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:3000".to_string()],
        request_timeout_secs: 60,
        shutdown_timeout_secs: 5,
        database_url: None,
        python_env_dir: env_dir.path().to_path_buf(),
        python_bin: "python3".to_string(),
        compile_timeout_ms: 30_000,
        seed_default_environments: false,
    }
}

pub fn build_test_context() -> TestContext {
    build_test_context_with_python("python3")
}

/// Like [`build_test_context`] but with a chosen system interpreter.
pub fn build_test_context_with_python(python_bin: &str) -> TestContext {
    let env_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&env_dir);
    config.python_bin = python_bin.to_string();

    let store = Arc::new(MemoryEnvironmentStore::new());
    let dyn_store: Arc<dyn EnvironmentStore> = store.clone();

    let venvs = Arc::new(VenvManager::new(VenvConfig {
        base_dir: config.python_env_dir.clone(),
        python_bin: config.python_bin.clone(),
        timeouts: VenvTimeouts::default(),
    }));
    let (installs, jobs) = InstallQueue::channel();
    let orchestrator = Arc::new(ExecutionOrchestrator::new(
        StagePipeline::new(Duration::from_millis(config.compile_timeout_ms)),
        config.python_bin.clone(),
        Arc::clone(&dyn_store),
        installs.clone(),
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        store: dyn_store,
        venvs: Arc::clone(&venvs),
        orchestrator,
        installs,
        event_bus: Arc::new(EventBus::default()),
    };

    TestContext {
        app: build_app_router(state, &config),
        store,
        venvs,
        jobs,
        env_dir,
    }
}

/// Whether `program` resolves on `PATH`.
pub fn has_toolchain(program: &str) -> bool {
    which::which(program).is_ok()
}

/// Poll until `path` no longer exists. Directory removal runs detached from
/// the request that asked for it.
pub async fn wait_until_removed(path: &std::path::Path) -> bool {
    for _ in 0..50 {
        if !path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, Body::empty(), false).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, Body::empty(), false).await
}

pub async fn post_json(app: Router, uri: &str, json: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, Body::from(json.to_string()), true).await
}

pub async fn put_json(app: Router, uri: &str, json: serde_json::Value) -> Response<Body> {
    send(app, Method::PUT, uri, Body::from(json.to_string()), true).await
}

/// POST a raw (possibly malformed) JSON body.
pub async fn post_raw(app: Router, uri: &str, body: &'static str) -> Response<Body> {
    send(app, Method::POST, uri, Body::from(body), true).await
}

async fn send(app: Router, method: Method, uri: &str, body: Body, json: bool) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if json {
        builder = builder.header("content-type", "application/json");
    }
    app.oneshot(builder.body(body).unwrap()).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
