//! HTTP clients for the ingestion service and the app manager

pub mod app;
pub mod client;
pub mod endpoints;
pub mod types;

pub use app::AppManagerClient;
pub use client::JobControlClient;
pub use types::*;

use crate::config::is_in_cluster;
use crate::error::{IngestError, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Build a client for `base_url`, relaxing certificate checks only for
/// in-cluster hosts.
pub fn http_client(base_url: &str, timeout: Duration) -> Result<reqwest::Client> {
    let in_cluster = is_in_cluster(base_url);
    if in_cluster {
        debug!(base_url, "Skipping TLS verification for in-cluster host");
    }

    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(in_cluster)
        .build()?)
}

/// Read a JSON body, turning decode failures into a retryable internal
/// error that keeps the raw body and headers.
pub(crate) async fn decode_json<T: DeserializeOwned>(
    response: reqwest::Response,
    origin: &str,
    service: &str,
) -> Result<T> {
    let headers = format!("{:?}", response.headers());
    let body = response.text().await?;
    serde_json::from_str(&body)
        .map_err(|e| IngestError::undecodable_response(origin, service, &body, &headers, &e))
}

/// Like [`decode_json`] but an empty body decodes to `null`.
pub(crate) async fn decode_optional_json(
    response: reqwest::Response,
    origin: &str,
    service: &str,
) -> Result<serde_json::Value> {
    let headers = format!("{:?}", response.headers());
    let body = response.text().await?;
    if body.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_str(&body)
        .map_err(|e| IngestError::undecodable_response(origin, service, &body, &headers, &e))
}
