use crate::api::JobControlClient;
use crate::error::{IngestError, Result};
use crate::retry::{with_retry, RetryPolicy};
use crate::upload::{UploadArtifact, Uploader};
use async_trait::async_trait;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use std::sync::Arc;
use tracing::{info, instrument};

/// PUTs artifacts to a pre-signed URL fetched from the ingestion service
/// right before each upload.
pub struct SignedUrlUploader {
    jobs: Arc<JobControlClient>,
    http: reqwest::Client,
    job_id: String,
    retry: RetryPolicy,
}

impl SignedUrlUploader {
    pub fn new(jobs: Arc<JobControlClient>, http: reqwest::Client, job_id: &str, retry: RetryPolicy) -> Self {
        Self {
            jobs,
            http,
            job_id: job_id.to_string(),
            retry,
        }
    }
}

#[async_trait]
impl Uploader for SignedUrlUploader {
    #[instrument(skip(self), fields(job_id = %self.job_id))]
    async fn upload(&mut self, artifact: &UploadArtifact) -> Result<()> {
        let url = self.jobs.signing_url(&self.job_id).await?;
        let data = tokio::fs::read(&artifact.path).await.map_err(|e| {
            IngestError::stage_write(format!("Failed to read {}: {}", artifact.path.display(), e))
        })?;
        let size = data.len();
        let (http, url, data) = (&self.http, &url, &data);

        with_retry(&self.retry, "signed_url_upload", move || async move {
            http.put(url)
                .header(CONTENT_ENCODING, "gzip")
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(data.clone())
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        })
        .await
        .map_err(IngestError::into_stage_write)?;

        info!(artifact = %artifact.file_name, bytes = size, "Uploaded artifact to signed URL");
        Ok(())
    }
}
