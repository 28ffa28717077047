// src/bin/check_store.rs
// Verify the configured GCS credentials can write to the export folder.

use anyhow::{bail, Context, Result};
use awardsetl::{
    config::{Config, ExportTarget},
    store::GcsStore,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cfg = Config::from_env()?;
    let Some(ExportTarget::Gcs {
        bucket,
        folder_id,
        credentials,
    }) = cfg.export
    else {
        bail!("GCS_BUCKET and GCS_FOLDER_ID must be set");
    };

    match std::env::var("GOOGLE_APPLICATION_CREDENTIALS") {
        Ok(path) if credentials.is_none() => info!("using GOOGLE_APPLICATION_CREDENTIALS: {}", path),
        _ => info!(credentials = ?credentials, "credentials"),
    }

    let store = GcsStore::connect(&bucket, &folder_id, credentials.as_deref())
        .await
        .context("initializing GCS client")?;

    match store.check_access().await {
        Ok(location) => {
            info!(%location, "GCS credentials and bucket access check passed");
            Ok(())
        }
        Err(e) => {
            error!(bucket = %bucket, folder = %folder_id, "upload failed: {:#}", e);
            Err(e)
        }
    }
}
