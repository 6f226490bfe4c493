/// Server setup and initialization
///
/// Wires together all components: directory, storage, workflow engine,
/// notifiers, escalation scheduler and HTTP routes.

use crate::{
    api::{create_api_routes, AppState},
    config::Config,
    directory::DirectoryRegistry,
    runtime::{
        engine::WorkflowEngine,
        notifier::{LogNotifier, NotificationDispatcher, WebhookNotifier},
        scheduler::EscalationScheduler,
    },
    storage::SqliteStore,
};
use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Build the shared application state
///
/// Loads the organization directory, opens the approvals database, builds
/// the engine and starts the stale-step scheduler when enabled.
pub async fn create_state(config: &Config) -> Result<AppState> {
    tracing::info!("📇 Loading organization directory");
    let directory = Arc::new(
        DirectoryRegistry::from_file(&config.directory.org_file).map_err(|e| {
            anyhow::anyhow!(
                "Failed to load organization directory {}: {:#}",
                config.directory.org_file,
                e
            )
        })?,
    );

    tracing::info!("🗄️ Opening approvals database");
    let store = Arc::new(
        SqliteStore::open(&config.database.data_dir)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open approvals database: {}", e))?,
    );

    tracing::info!("📨 Initializing notification dispatcher");
    let mut notifications =
        NotificationDispatcher::new(config.notifications.timeout()).with_notifier(Arc::new(LogNotifier));
    if let Some(url) = &config.notifications.webhook_url {
        tracing::info!("🔗 Forwarding workflow events to {}", url);
        notifications = notifications.with_notifier(Arc::new(WebhookNotifier::new(url.clone())));
    }

    tracing::info!("🚀 Initializing workflow engine");
    let engine = Arc::new(WorkflowEngine::new(
        Arc::clone(&directory),
        store,
        notifications,
        config.workflow.policy(),
    ));

    let scheduler = if config.workflow.auto_escalation_enabled() {
        tracing::info!("⏰ Initializing escalation scheduler");
        let scheduler = EscalationScheduler::new(
            Arc::clone(&engine),
            &config.workflow.escalation_schedule,
            config.workflow.escalation_after_hours,
        )
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize escalation scheduler: {}", e))?;
        scheduler
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to start escalation scheduler: {}", e))?;
        Some(Arc::new(scheduler))
    } else {
        tracing::info!("⏸️ Auto-escalation disabled");
        None
    };

    Ok(AppState {
        engine,
        directory,
        scheduler,
    })
}

/// Create the main Axum application with all routes
pub fn create_router(state: AppState) -> Router {
    tracing::info!("📡 Creating HTTP router with all endpoints");
    Router::new()
        .route("/healthz", get(health_check))
        .merge(create_api_routes().with_state(state))
}

pub async fn create_app(config: Config) -> Result<Router> {
    let state = create_state(&config).await?;
    let app = create_router(state);
    tracing::info!("✅ Application initialized successfully");
    Ok(app)
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting Approvalway server...");

    let state = create_state(&config).await?;
    let app = create_router(state.clone());
    tracing::info!("✅ Application initialized successfully");

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(scheduler) = &state.scheduler {
        scheduler.stop().await?;
    }
    tracing::info!(
        "👋 Server stopped, notifications: {:?}",
        state.engine.notifications().stats()
    );

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("❌ Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("⏹️ Shutdown signal received");
}

async fn health_check() -> &'static str {
    "ok"
}
