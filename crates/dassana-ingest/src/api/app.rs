//! App-manager client: ingestion configs and collector status

use crate::api::types::StatusReport;
use crate::api::{decode_json, endpoints, http_client};
use crate::auth::AuthClient;
use crate::config::Config;
use crate::error::Result;
use crate::retry::{with_retry, RetryPolicy};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};

const SERVICE: &str = "app-manager";

pub struct AppManagerClient {
    http: reqwest::Client,
    base_url: String,
    auth: Arc<AuthClient>,
    retry: RetryPolicy,
}

impl AppManagerClient {
    pub fn new(config: &Config, auth: Arc<AuthClient>) -> Result<Self> {
        Ok(Self {
            http: http_client(&config.app_url, config.http_timeout)?,
            base_url: config.app_url.clone(),
            auth,
            retry: config.retry,
        })
    }

    #[instrument(skip(self))]
    pub async fn ingestion_config(&self, config_id: &str, app_id: &str) -> Result<Value> {
        let url = endpoints::ingestion_config_url(&self.base_url, app_id, config_id);
        let (this, url) = (self, &url);

        with_retry(&self.retry, "ingestion_config", move || async move {
            let headers = this.auth.headers().await?;
            let response = this
                .http
                .get(url)
                .headers(headers)
                .send()
                .await?
                .error_for_status()?;
            decode_json(response, "Failed to get ingestion config", SERVICE).await
        })
        .await
    }

    /// Returns the HTTP status; the caller decides what a rejection means.
    #[instrument(skip(self, payload))]
    pub async fn patch_ingestion_config(
        &self,
        payload: &Value,
        config_id: &str,
        app_id: &str,
    ) -> Result<u16> {
        let url = endpoints::ingestion_config_url(&self.base_url, app_id, config_id);
        let (this, url) = (self, &url);

        with_retry(&self.retry, "patch_ingestion_config", move || async move {
            let headers = this.auth.headers().await?;
            let response = this.http.patch(url).headers(headers).json(payload).send().await?;
            Ok(response.status().as_u16())
        })
        .await
    }

    #[instrument(skip(self, report), fields(status = %report.status))]
    pub async fn report_status(&self, report: &StatusReport, app_id: &str) -> Result<u16> {
        let url = endpoints::status_url(&self.base_url, app_id);
        let (this, url) = (self, &url);

        let status = with_retry(&self.retry, "report_status", move || async move {
            let headers = this.auth.headers().await?;
            let response = this.http.post(url).headers(headers).json(report).send().await?;
            Ok(response.status().as_u16())
        })
        .await?;

        info!(
            status,
            records = report.records_ingested,
            "Reported collector status"
        );
        Ok(status)
    }
}
