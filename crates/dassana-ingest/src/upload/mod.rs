//! Upload backends for finished buffer artifacts
//!
//! The stage details returned at job creation pick one backend per writer:
//!
//! - **Signed URL**: partner mode, or no stage bucket. A signing URL is
//!   fetched for every upload and the artifact is PUT to it.
//! - **GCS**: object `{file_path}/{artifact}` using the service-account file
//!   the writer materializes locally.
//! - **S3**: static keys, or STS AssumeRole when a role ARN is supplied.

pub mod gcs;
pub mod s3;
pub mod session;
pub mod signed_url;

pub use gcs::GcsUploader;
pub use s3::S3Uploader;
pub use session::{RoleAssumer, SessionCache, SessionCredentials, StsRoleAssumer};
pub use signed_url::SignedUrlUploader;

use crate::api::{JobControlClient, StageDetails};
use crate::config::Config;
use crate::error::{IngestError, Result};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::SdkError;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Region used for S3 stages that do not name one.
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Timeouts, dispatch failures and 5xx/429 replies from an AWS SDK call.
pub(crate) fn is_transient_sdk_error<E>(err: &SdkError<E, HttpResponse>) -> bool {
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => true,
        SdkError::ServiceError(context) => {
            let code = context.raw().status().as_u16();
            code >= 500 || code == 429
        },
        _ => false,
    }
}

/// Retryable error for a transient SDK failure, stage write otherwise.
pub(crate) fn sdk_failure(service: &str, message: String, transient: bool) -> IngestError {
    if transient {
        IngestError::unavailable(service, message)
    } else {
        IngestError::stage_write(message)
    }
}

/// A compressed buffer file ready to leave the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadArtifact {
    pub path: PathBuf,
    /// Local file name, e.g. `1700000000.ndjson.gz`
    pub file_name: String,
}

impl UploadArtifact {
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                IngestError::invalid_input(format!("Artifact path has no file name: {}", path.display()))
            })?
            .to_string();
        Ok(Self { path, file_name })
    }

    /// Object key under the stage prefix.
    pub fn object_key(&self, prefix: &str) -> String {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            self.file_name.clone()
        } else {
            format!("{}/{}", prefix, self.file_name)
        }
    }
}

/// IAM role to assume before writing to S3
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumeRole {
    pub role_arn: String,
    pub external_id: Option<String>,
}

/// Backend chosen from the job's stage details
#[derive(Debug, Clone, PartialEq)]
pub enum UploadTarget {
    SignedUrl,
    Gcs {
        bucket: String,
        file_path: String,
        credentials_json: String,
    },
    S3 {
        bucket: String,
        file_path: String,
        access_key: String,
        secret_key: String,
        region: String,
        role: Option<AssumeRole>,
    },
}

impl UploadTarget {
    /// Pick the backend. Partner mode and bucket-less stages always use
    /// signed URLs; anything else must name a known cloud.
    pub fn from_stage(stage: Option<&StageDetails>, partner: bool) -> Result<Self> {
        let stage = match stage {
            Some(stage) if !partner && stage.bucket.is_some() => stage,
            _ => return Ok(UploadTarget::SignedUrl),
        };

        let bucket = stage.bucket.clone().unwrap_or_default();
        let file_path = stage.file_path.clone().unwrap_or_default();

        match stage.cloud.as_deref() {
            Some("gcp") => {
                let credentials_json = match &stage.service_account_credentials_json {
                    Some(serde_json::Value::String(raw)) => {
                        let parsed: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
                            IngestError::config(format!("Invalid service account credentials: {}", e))
                        })?;
                        serde_json::to_string_pretty(&parsed)?
                    },
                    Some(value) => serde_json::to_string_pretty(value)?,
                    None => {
                        return Err(IngestError::config(
                            "GCP stage details are missing serviceAccountCredentialsJson",
                        ))
                    },
                };
                Ok(UploadTarget::Gcs {
                    bucket,
                    file_path,
                    credentials_json,
                })
            },
            Some("aws") => {
                let access_key = stage.access_key.clone().ok_or_else(|| {
                    IngestError::config("AWS stage details are missing accessKey")
                })?;
                let secret_key = stage.secret_key.clone().ok_or_else(|| {
                    IngestError::config("AWS stage details are missing secretKey")
                })?;
                let role = stage.aws_iam_role_arn.clone().map(|role_arn| AssumeRole {
                    role_arn,
                    external_id: stage.aws_iam_external_id.clone(),
                });
                Ok(UploadTarget::S3 {
                    bucket,
                    file_path,
                    access_key,
                    secret_key,
                    region: stage
                        .region
                        .clone()
                        .unwrap_or_else(|| DEFAULT_AWS_REGION.to_string()),
                    role,
                })
            },
            other => Err(IngestError::config(format!(
                "Unrecognized storage backend: {}",
                other.unwrap_or("<none>")
            ))),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            UploadTarget::SignedUrl => "signed_url",
            UploadTarget::Gcs { .. } => "gcs",
            UploadTarget::S3 { .. } => "s3",
        }
    }
}

#[async_trait]
pub trait Uploader: Send {
    /// Push one artifact. Failures come back as stage-write errors unless
    /// they came from the control plane.
    async fn upload(&mut self, artifact: &UploadArtifact) -> Result<()>;
}

/// Everything a factory may need besides the target itself
pub struct UploadContext<'a> {
    pub job_id: &'a str,
    pub jobs: &'a Arc<JobControlClient>,
    /// Service-account file written by the writer for GCS targets
    pub credentials_file: Option<&'a Path>,
}

#[async_trait]
pub trait UploaderFactory: Send + Sync {
    async fn create(&self, target: &UploadTarget, ctx: UploadContext<'_>) -> Result<Box<dyn Uploader>>;
}

/// Factory for the real cloud backends
pub struct CloudUploaderFactory {
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl CloudUploaderFactory {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(config.http_timeout).build()?,
            retry: config.retry,
        })
    }
}

#[async_trait]
impl UploaderFactory for CloudUploaderFactory {
    async fn create(&self, target: &UploadTarget, ctx: UploadContext<'_>) -> Result<Box<dyn Uploader>> {
        match target {
            UploadTarget::SignedUrl => Ok(Box::new(SignedUrlUploader::new(
                Arc::clone(ctx.jobs),
                self.http.clone(),
                ctx.job_id,
                self.retry,
            ))),
            UploadTarget::Gcs {
                bucket, file_path, ..
            } => {
                let credentials = ctx.credentials_file.ok_or_else(|| {
                    IngestError::invalid_state("GCS target without a credentials file")
                })?;
                Ok(Box::new(GcsUploader::new(bucket, file_path, credentials, self.retry)))
            },
            UploadTarget::S3 {
                bucket,
                file_path,
                access_key,
                secret_key,
                region,
                role,
            } => {
                let uploader = S3Uploader::new(bucket, file_path, region, access_key, secret_key, self.retry);
                Ok(Box::new(match role {
                    Some(role) => {
                        let assumer =
                            StsRoleAssumer::new(access_key, secret_key, region, role, ctx.job_id, self.retry);
                        uploader.with_session(SessionCache::new(Box::new(assumer)))
                    },
                    None => uploader,
                }))
            },
        }
    }
}
