//! Dassana Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities for the Dassana ingestion workspace.
//!
//! - **Logging**: process-wide `tracing` subscriber setup driven by `DASSANA_LOG_*`
//! - **Compression**: gzip helpers used for upload artifacts and log decoding
//! - **Errors**: the [`CommonError`] type returned by the helpers above
//!
//! # Example
//!
//! ```no_run
//! use dassana_common::compression::gzip_file;
//! use dassana_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&LogConfig::from_env()?)?;
//!     let artifact = gzip_file("1700000000.ndjson")?;
//!     tracing::info!(path = %artifact.display(), "compressed");
//!     Ok(())
//! }
//! ```

pub mod compression;
pub mod error;
pub mod logging;

pub use error::{CommonError, Result};
