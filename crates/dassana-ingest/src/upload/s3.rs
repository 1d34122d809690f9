use crate::error::{IngestError, Result};
use crate::retry::{with_retry, RetryPolicy};
use crate::upload::{is_transient_sdk_error, sdk_failure, SessionCache, UploadArtifact, Uploader};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use tracing::{debug, info, instrument};

pub struct S3Uploader {
    bucket: String,
    prefix: String,
    region: String,
    access_key: String,
    secret_key: String,
    session: Option<SessionCache>,
    retry: RetryPolicy,
}

impl S3Uploader {
    pub fn new(
        bucket: &str,
        prefix: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            region: region.to_string(),
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
            session: None,
            retry,
        }
    }

    /// Write with assumed-role sessions instead of the static keys.
    pub fn with_session(mut self, session: SessionCache) -> Self {
        self.session = Some(session);
        self
    }

    async fn client(&mut self) -> Result<Client> {
        let credentials = match self.session.as_mut() {
            Some(session) => session.credentials().await?.to_sdk("dassana-sts"),
            None => Credentials::new(&self.access_key, &self.secret_key, None, None, "dassana-stage"),
        };

        let config = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(self.region.clone()))
            .build();
        Ok(Client::from_conf(config))
    }
}

#[async_trait]
impl Uploader for S3Uploader {
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn upload(&mut self, artifact: &UploadArtifact) -> Result<()> {
        let key = artifact.object_key(&self.prefix);
        let client = self.client().await?;

        debug!("Uploading {} to s3://{}/{}", artifact.path.display(), self.bucket, key);

        let (client, bucket, key_ref, path) = (&client, &self.bucket, &key, &artifact.path);
        with_retry(&self.retry, "s3_put_object", move || async move {
            let body = ByteStream::from_path(path)
                .await
                .map_err(|e| IngestError::stage_write(format!("Failed to read {}: {}", path.display(), e)))?;

            client
                .put_object()
                .bucket(bucket)
                .key(key_ref)
                .content_encoding("gzip")
                .body(body)
                .send()
                .await
                .map_err(|e| {
                    let transient = is_transient_sdk_error(&e);
                    sdk_failure(
                        "S3",
                        format!("Failed to upload to s3://{}/{}: {}", bucket, key_ref, e),
                        transient,
                    )
                })?;
            Ok(())
        })
        .await
        .map_err(IngestError::into_stage_write)?;

        info!("Successfully uploaded to s3://{}/{}", self.bucket, key);
        Ok(())
    }
}
