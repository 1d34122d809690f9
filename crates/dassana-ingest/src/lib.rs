//! Dassana Ingestion Client
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Streams newline-delimited JSON records into the Dassana ingestion
//! pipeline.
//!
//! # Overview
//!
//! - **Auth**: OAuth client-credentials tokens, or a static partner token
//! - **Job control**: job creation, signing URLs and done/cancel reports,
//!   retried with a fixed delay
//! - **Writer**: rotating local buffers that are gzipped and uploaded to a
//!   signed URL, GCS or S3 as they fill up
//! - **Normalizers**: cloud log formats turned into JSON records
//!
//! # Example
//!
//! ```no_run
//! use dassana_ingest::{Config, IngestionWriter, JobRequest};
//! use serde_json::json;
//!
//! # async fn run() -> dassana_ingest::Result<()> {
//! let config = Config::load()?;
//! let request = JobRequest::new("aws_s3_access", "snapshot", "cfg-1");
//! let mut writer = IngestionWriter::create(&config, request).await?;
//!
//! match writer.write(&json!({"bucket": "logs"})).await {
//!     Ok(()) => {
//!         writer.record_pass();
//!         writer.close(1, 0, Vec::<String>::new()).await?;
//!     },
//!     Err(e) => {
//!         writer.cancel(&e).await?;
//!     },
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod normalize;
pub mod retry;
pub mod upload;
pub mod writer;

pub use api::{AppManagerClient, FailType, JobControlClient};
pub use auth::AuthClient;
pub use config::{AuthMode, Config};
pub use error::{ErrorKind, IngestError, Result};
pub use normalize::Normalizer;
pub use retry::RetryPolicy;
pub use upload::{UploadTarget, Uploader, UploaderFactory};
pub use writer::{IngestionWriter, JobRequest, WriterOptions, WriterState};
