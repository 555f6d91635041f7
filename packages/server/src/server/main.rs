// Main entry point for the preview service

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use preview_core::kernel::jobs::{JobManager, PostgresJobStore};
use preview_core::kernel::{cleanup, HttpTemplateFetcher, JobWorkspace, RenderServerClient, ServerDeps};
use preview_core::server::build_app;
use preview_core::Config;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,preview_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting typeset preview service");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    // Prepare the job workspace
    let workspace = JobWorkspace::new(&config.workspace_dir);
    workspace
        .ensure_dirs()
        .await
        .context("Failed to prepare workspace directories")?;

    // Wire up dependencies
    let store = Arc::new(PostgresJobStore::new(pool.clone()));
    let template_fetcher = Arc::new(
        HttpTemplateFetcher::new(config.template_server_url.clone())
            .context("Failed to create template client")?,
    );
    let script_runner = Arc::new(
        RenderServerClient::new(
            config.render_server_url.clone(),
            Duration::from_secs(config.render_timeout_secs),
            workspace.clone(),
        )
        .context("Failed to create render client")?,
    );
    let deps = ServerDeps::new(store, template_fetcher, script_runner, workspace);

    // Reconcile jobs left in flight by a previous process before serving
    // anything. A failure here is fatal by design.
    let manager = JobManager::start(deps)
        .await
        .context("Failed to reconcile persisted jobs at startup")?;

    // Start scheduled tasks
    let _scheduler = cleanup::start_scheduler(
        Arc::clone(&manager),
        chrono::Duration::seconds(config.max_preview_age_secs),
    )
    .await
    .context("Failed to start scheduled tasks")?;

    // Build application
    let app = build_app(pool, manager);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
