use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use layerfs::server;
use layerfs::{Config, ObjectStore, S3ObjectStore, SqliteCatalog, StorageManager};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "layerfs=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting layerfs storage server");

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded: {:?}", config);

    let catalog = Arc::new(SqliteCatalog::open(&config.db_path)?);
    tracing::info!(path = %config.db_path, "catalog opened");

    let object_store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(
        &config.s3_bucket,
        &config.s3_endpoint,
        &config.s3_region,
        &config.s3_access_key,
        &config.s3_secret_key,
    )?);
    tracing::info!(bucket = %config.s3_bucket, endpoint = %config.s3_endpoint, "object store configured");

    let manager = StorageManager::new(catalog, object_store);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::run_server(config, manager).await {
            tracing::error!("Server error: {}", e);
        }
    });

    tokio::select! {
        _ = server_handle => {
            tracing::warn!("Server stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
    }

    Ok(())
}
