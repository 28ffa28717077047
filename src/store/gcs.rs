// src/store/gcs.rs

use anyhow::{Context, Result};
use google_cloud_storage::{
    client::{google_cloud_auth::credentials::CredentialsFile, Client, ClientConfig},
    http::objects::upload::{Media, UploadObjectRequest, UploadType},
};
use std::path::Path;
use tokio::runtime::Handle;
use tracing::{info, instrument};

use super::{Exporter, CSV_CONTENT_TYPE};
use crate::table::{to_csv_bytes, Table};

/// CSV exports into a folder of a Cloud Storage bucket.
pub struct GcsStore {
    client: Client,
    bucket: String,
    folder_id: String,
}

impl GcsStore {
    /// Authenticate with the given service-account file, or with application
    /// default credentials when none is given.
    pub async fn connect(
        bucket: &str,
        folder_id: &str,
        credentials: Option<&Path>,
    ) -> Result<Self> {
        let config = match credentials {
            Some(path) => {
                let file = CredentialsFile::new_from_file(path.display().to_string())
                    .await
                    .with_context(|| format!("reading credentials {}", path.display()))?;
                ClientConfig::default()
                    .with_credentials(file)
                    .await
                    .context("authenticating to GCS with credentials file")?
            }
            None => ClientConfig::default()
                .with_auth()
                .await
                .context("authenticating to GCS")?,
        };
        info!(bucket, folder_id, "GCS client ready");
        Ok(Self {
            client: Client::new(config),
            bucket: bucket.to_string(),
            folder_id: folder_id.trim_matches('/').to_string(),
        })
    }

    fn object_name(&self, file_name: &str) -> String {
        object_path(&self.folder_id, file_name)
    }

    async fn put(&self, object_name: String, data: Vec<u8>, content_type: &'static str) -> Result<()> {
        let len = data.len();
        let mut media = Media::new(object_name.clone());
        media.content_type = content_type.into();
        media.content_length = Some(len as u64);
        let request = UploadObjectRequest {
            bucket: self.bucket.clone(),
            ..Default::default()
        };
        self.client
            .upload_object(&request, data, &UploadType::Simple(media))
            .await
            .with_context(|| format!("uploading {} to bucket {}", object_name, self.bucket))?;
        info!(object = %object_name, bytes = len, "Uploaded to GCS");
        Ok(())
    }

    /// Upload `table` as `<folder_id>/<title>.csv`.
    #[instrument(level = "info", skip(self, table), fields(bucket = %self.bucket))]
    pub async fn upload(&self, title: &str, table: &Table) -> Result<String> {
        let data = to_csv_bytes(table)?;
        let object_name = self.object_name(&format!("{}.csv", title));
        self.put(object_name.clone(), data, CSV_CONTENT_TYPE).await?;
        info!("File {} uploaded to bucket {}.", title, self.bucket);
        Ok(format!("gs://{}/{}", self.bucket, object_name))
    }

    /// Upload a tiny marker object to prove the credentials can write to the folder.
    pub async fn check_access(&self) -> Result<String> {
        let object_name = self.object_name(&format!(
            "access-check-{}.txt",
            chrono::Utc::now().timestamp()
        ));
        self.put(object_name.clone(), b"access check".to_vec(), "text/plain")
            .await?;
        Ok(format!("gs://{}/{}", self.bucket, object_name))
    }
}

/// Blocks on the upload; call it from a blocking thread inside a Tokio runtime.
impl Exporter for GcsStore {
    fn store(&self, title: &str, table: &Table) -> Result<String> {
        let handle = Handle::try_current().context("GCS export needs a Tokio runtime")?;
        handle.block_on(self.upload(title, table))
    }
}

fn object_path(folder_id: &str, file_name: &str) -> String {
    if folder_id.is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{}", folder_id, file_name)
    }
}
