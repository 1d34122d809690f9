use crate::error::{IngestError, Result};
use crate::retry::{with_retry, RetryPolicy};
use crate::upload::{sdk_failure, UploadArtifact, Uploader};
use async_trait::async_trait;
use google_cloud_storage::client::google_cloud_auth::credentials::CredentialsFile;
use google_cloud_storage::client::{Client, ClientConfig};
use google_cloud_storage::http::Error as GcsError;
use google_cloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Uploads to a GCS bucket with a service-account key file.
///
/// The client is built on first upload so a bad key surfaces as a stage
/// write failure, not a construction error.
pub struct GcsUploader {
    bucket: String,
    prefix: String,
    credentials_file: PathBuf,
    client: Option<Client>,
    retry: RetryPolicy,
}

impl GcsUploader {
    pub fn new(bucket: &str, prefix: &str, credentials_file: &Path, retry: RetryPolicy) -> Self {
        Self {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            credentials_file: credentials_file.to_path_buf(),
            client: None,
            retry,
        }
    }

    async fn connect(&self) -> Result<Client> {
        let path = self.credentials_file.to_string_lossy().to_string();
        let credentials = CredentialsFile::new_from_file(path).await.map_err(|e| {
            IngestError::stage_write(format!(
                "Failed to load credentials from '{}': {}",
                self.credentials_file.display(),
                e
            ))
        })?;
        let config = ClientConfig::default()
            .with_credentials(credentials)
            .await
            .map_err(|e| IngestError::stage_write(format!("Failed to configure GCS client: {}", e)))?;
        Ok(Client::new(config))
    }
}

#[async_trait]
impl Uploader for GcsUploader {
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn upload(&mut self, artifact: &UploadArtifact) -> Result<()> {
        if self.client.is_none() {
            self.client = Some(self.connect().await?);
        }
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| IngestError::invalid_state("GCS client missing after connect"))?;

        let object_name = artifact.object_key(&self.prefix);
        let data = tokio::fs::read(&artifact.path)
            .await
            .map_err(|e| IngestError::stage_write(format!("Failed to read {}: {}", artifact.path.display(), e)))?;

        debug!(
            "Uploading {} bytes to gs://{}/{}",
            data.len(),
            self.bucket,
            object_name
        );

        let upload_type = UploadType::Simple(Media::new(object_name.clone()));
        let request = UploadObjectRequest {
            bucket: self.bucket.clone(),
            ..Default::default()
        };
        let (bucket, object, data, request, upload_type) =
            (&self.bucket, &object_name, &data, &request, &upload_type);

        with_retry(&self.retry, "gcs_upload_object", move || async move {
            client
                .upload_object(request, data.clone(), upload_type)
                .await
                .map_err(|e| {
                    let transient = is_transient(&e);
                    sdk_failure(
                        "GCS",
                        format!("Failed to upload to gs://{}/{}: {}", bucket, object, e),
                        transient,
                    )
                })?;
            Ok(())
        })
        .await
        .map_err(IngestError::into_stage_write)?;

        info!("Successfully uploaded to gs://{}/{}", self.bucket, object_name);
        Ok(())
    }
}

/// Transport failures and 5xx/429 replies from the storage API.
fn is_transient(err: &GcsError) -> bool {
    match err {
        GcsError::Response(response) => response.code >= 500 || response.code == 429,
        GcsError::HttpClient(_) => true,
        _ => false,
    }
}
