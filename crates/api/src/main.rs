use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use coderun_core::runner::pipeline::StagePipeline;
use coderun_core::runner::venv::{VenvConfig, VenvManager, VenvTimeouts};
use coderun_db::{EnvironmentStore, MemoryEnvironmentStore, PgEnvironmentStore};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coderun_api::background::{install_supervisor, startup_verifier};
use coderun_api::config::ServerConfig;
use coderun_api::execution::ExecutionOrchestrator;
use coderun_api::router::build_app_router;
use coderun_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coderun_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        python_env_dir = %config.python_env_dir.display(),
        python_bin = %config.python_bin,
        "Loaded server configuration",
    );

    // --- Environment store ---
    let store: Arc<dyn EnvironmentStore> = match &config.database_url {
        Some(database_url) => {
            let pool = coderun_db::create_pool(database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            coderun_db::health_check(&pool)
                .await
                .expect("Database health check failed");
            tracing::info!("Database health check passed");

            coderun_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            Arc::new(PgEnvironmentStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; environment metadata is kept in memory");
            Arc::new(MemoryEnvironmentStore::new())
        }
    };

    // --- Environments on disk ---
    let venvs = Arc::new(VenvManager::new(VenvConfig {
        base_dir: config.python_env_dir.clone(),
        python_bin: config.python_bin.clone(),
        timeouts: VenvTimeouts::default(),
    }));

    // --- Event bus ---
    let event_bus = Arc::new(coderun_events::EventBus::default());
    tokio::spawn(coderun_events::EventLogger::run(event_bus.subscribe()));

    // --- Install supervisor ---
    let (installs, install_jobs) = install_supervisor::InstallQueue::channel();
    let supervisor = Arc::new(install_supervisor::InstallSupervisor::new(
        Arc::clone(&store),
        Arc::clone(&venvs),
        Arc::clone(&event_bus),
    ));
    let supervisor_cancel = CancellationToken::new();
    let supervisor_handle = tokio::spawn(supervisor.run(install_jobs, supervisor_cancel.clone()));

    // --- Startup verification (does not block serving) ---
    startup_verifier::log_toolchains(&config.python_bin);
    {
        let store = Arc::clone(&store);
        let installs = installs.clone();
        let seed = config.seed_default_environments;
        tokio::spawn(async move {
            if let Err(e) = startup_verifier::run(store.as_ref(), &installs, seed).await {
                tracing::error!(error = %e, "Startup environment verification failed");
            }
        });
    }

    // --- App state ---
    let orchestrator = Arc::new(ExecutionOrchestrator::new(
        StagePipeline::new(Duration::from_millis(config.compile_timeout_ms)),
        config.python_bin.clone(),
        Arc::clone(&store),
        installs.clone(),
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        store,
        venvs,
        orchestrator,
        installs,
        event_bus,
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    supervisor_cancel.cancel();
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(shutdown_timeout, supervisor_handle)
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = config.shutdown_timeout_secs,
            "Install supervisor did not stop in time",
        );
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
