use anyhow::{Context, Result};
use catalog_service::admin::{AdminContext, Cli};
use catalog_service::config::Config;
use catalog_service::metadata_store::PgMetadataStore;
use catalog_service::object_store::S3ObjectStore;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Quiet by default; RUST_LOG shows the storage and database steps
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let config = Config::load().context("Failed to load configuration")?;

    let metadata_store = Arc::new(
        PgMetadataStore::new(&config.database)
            .await
            .context("Failed to initialize metadata store")?,
    );
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

    let ctx = AdminContext::new(object_store, metadata_store, config.limits());
    cli.run(&ctx, &mut std::io::stdout()).await
}
