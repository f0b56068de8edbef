use anyhow::{Context, Result};
use catalog_service::api::{start_api_server, AppState};
use catalog_service::category_guard::CategoryGuard;
use catalog_service::config::Config;
use catalog_service::lifecycle::ProjectLifecycle;
use catalog_service::metadata_store::PgMetadataStore;
use catalog_service::object_store::S3ObjectStore;
use catalog_service::review_intake::ReviewIntake;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    let limits = config.limits();
    info!(
        service = %config.service.name,
        start_year = limits.start_year,
        current_year = limits.current_year,
        "Starting catalog service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize components
    let metadata_store = Arc::new(
        PgMetadataStore::new(&config.database)
            .await
            .context("Failed to initialize metadata store")?,
    );

    // Run migrations if enabled
    if config.database.run_migrations {
        metadata_store
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    let object_store = Arc::new(
        S3ObjectStore::new(&config.s3)
            .await
            .context("Failed to initialize object store")?,
    );

    // Create API state
    let api_state = AppState {
        lifecycle: Arc::new(ProjectLifecycle::new(
            object_store,
            metadata_store.clone(),
            limits,
        )),
        categories: Arc::new(CategoryGuard::new(metadata_store.clone())),
        reviews: Arc::new(ReviewIntake::new(metadata_store.clone())),
        metadata_store,
    };

    // Spawn API server task
    let api_config = config.api.clone();
    let max_request_bytes = config.max_request_bytes();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(api_state, &api_config, max_request_bytes).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Catalog service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down catalog service");

    // Abort tasks
    api_handle.abort();

    info!("Catalog service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
