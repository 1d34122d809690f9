//! Job control client for the ingestion service
//!
//! Every call goes through [`with_retry`]. A non-success status on job
//! creation is a hard internal error and is not retried.

use crate::api::types::*;
use crate::api::{decode_json, decode_optional_json, endpoints, http_client};
use crate::auth::AuthClient;
use crate::config::Config;
use crate::error::{IngestError, Result};
use crate::retry::{with_retry, RetryPolicy};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};

const SERVICE: &str = "ingestion-service";

pub struct JobControlClient {
    http: reqwest::Client,
    base_url: String,
    auth: Arc<AuthClient>,
    retry: RetryPolicy,
}

impl JobControlClient {
    pub fn new(config: &Config, auth: Arc<AuthClient>) -> Result<Self> {
        Ok(Self {
            http: http_client(&config.ingestion_url, config.http_timeout)?,
            base_url: config.ingestion_url.clone(),
            auth,
            retry: config.retry,
        })
    }

    /// Build the auth client as well.
    pub fn from_config(config: &Config) -> Result<Self> {
        let auth = Arc::new(AuthClient::new(config)?);
        Self::new(config, auth)
    }

    pub fn is_partner(&self) -> bool {
        self.auth.is_partner()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    #[instrument(skip(self, request), fields(source = %request.source, config_id = %request.config_id))]
    pub async fn create_job(&self, request: &CreateJobRequest) -> Result<CreateJobResponse> {
        let url = endpoints::create_job_url(&self.base_url);
        let (this, url) = (self, &url);

        let response = with_retry(&self.retry, "create_job", move || async move {
            let headers = this.auth.headers().await?;
            let response = this.http.post(url).headers(headers).json(request).send().await?;

            let status = response.status();
            if !status.is_success() {
                let headers = format!("{:?}", response.headers());
                let body = response.text().await.unwrap_or_default();
                return Err(IngestError::from_response(
                    "Failed to create ingestion job",
                    SERVICE,
                    &body,
                    &headers,
                    &format!("unexpected status {}", status),
                ));
            }

            decode_json::<CreateJobResponse>(response, "Failed to create ingestion job", SERVICE).await
        })
        .await?;

        info!(job_id = %response.job_id, "Created ingestion job");
        Ok(response)
    }

    #[instrument(skip(self))]
    pub async fn signing_url(&self, job_id: &str) -> Result<String> {
        let url = endpoints::signing_url(&self.base_url, job_id);
        let (this, url) = (self, &url);

        let response = with_retry(&self.retry, "signing_url", move || async move {
            let headers = this.auth.headers().await?;
            let response = this
                .http
                .get(url)
                .headers(headers)
                .send()
                .await?
                .error_for_status()?;
            decode_json::<SigningUrlResponse>(response, "The signing URL has not been received", SERVICE)
                .await
        })
        .await?;

        Ok(response.url)
    }

    #[instrument(skip(self, metadata))]
    pub async fn report_done<M>(&self, job_id: &str, metadata: &M) -> Result<Value>
    where
        M: Serialize + ?Sized + Sync,
    {
        let url = endpoints::done_url(&self.base_url, job_id);
        let result = self.post_report("report_done", &url, metadata).await?;
        info!(job_id, "Ingestion status updated to done");
        Ok(result)
    }

    #[instrument(skip(self, metadata))]
    pub async fn report_failure<M>(&self, job_id: &str, metadata: &M, fail_type: FailType) -> Result<Value>
    where
        M: Serialize + ?Sized + Sync,
    {
        let url = endpoints::failure_url(&self.base_url, job_id, fail_type.as_str());
        let result = self.post_report("report_failure", &url, metadata).await?;
        info!(job_id, %fail_type, "Ingestion status updated");
        Ok(result)
    }

    async fn post_report<M>(&self, operation: &str, url: &str, metadata: &M) -> Result<Value>
    where
        M: Serialize + ?Sized + Sync,
    {
        let body = ReportBody { metadata };
        let (this, body) = (self, &body);

        with_retry(&self.retry, operation, move || async move {
            let headers = this.auth.headers().await?;
            let response = this
                .http
                .post(url)
                .headers(headers)
                .json(body)
                .send()
                .await?
                .error_for_status()?;
            decode_optional_json(response, "Failed to read report response", SERVICE).await
        })
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::{AuthMode, Secret};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn partner_config(ingestion_url: &str) -> Config {
        Config {
            app_url: "https://app.example.com".to_string(),
            ingestion_url: ingestion_url.to_string(),
            auth_url: "https://auth.example.com".to_string(),
            auth: AuthMode::Partner {
                partner: "acme".to_string(),
                token: Secret::new("tok"),
            },
            app_id: None,
            partner_client_id: None,
            partner_tenant_id: None,
            debug: false,
            http_timeout: Duration::from_secs(5),
            retry: RetryPolicy::immediate(),
        }
    }

    fn job_request(priority: Option<i64>) -> CreateJobRequest {
        CreateJobRequest {
            source: "aws_alb".to_string(),
            record_type: "event".to_string(),
            config_id: "cfg-9".to_string(),
            is_snapshot: false,
            priority,
            metadata: json!({"region": "us-east-1"}),
        }
    }

    #[tokio::test]
    async fn test_create_job_without_priority() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/job/"))
            .and(header("authorization", "Dassana tok"))
            .and(body_json(json!({
                "source": "aws_alb",
                "recordType": "event",
                "configId": "cfg-9",
                "is_snapshot": false,
                "metadata": {"region": "us-east-1"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jobId": "job-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = JobControlClient::from_config(&partner_config(&server.uri())).unwrap();
        let response = client.create_job(&job_request(None)).await.unwrap();

        assert_eq!(response.job_id, "job-1");
        assert!(response.stage_details.is_none());
    }

    #[tokio::test]
    async fn test_create_job_with_zero_priority() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/job/"))
            .and(body_json(json!({
                "source": "aws_alb",
                "recordType": "event",
                "configId": "cfg-9",
                "is_snapshot": false,
                "priority": 0,
                "metadata": {"region": "us-east-1"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jobId": "job-2"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = JobControlClient::from_config(&partner_config(&server.uri())).unwrap();
        assert_eq!(client.create_job(&job_request(Some(0))).await.unwrap().job_id, "job-2");
    }

    #[tokio::test]
    async fn test_create_job_rejection_is_internal_and_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/job/"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(1)
            .mount(&server)
            .await;

        let client = JobControlClient::from_config(&partner_config(&server.uri())).unwrap();
        let err = client.create_job(&job_request(None)).await.unwrap_err();

        assert!(matches!(err, IngestError::Internal { .. }));
        assert!(err.to_string().contains("overloaded"));
    }

    #[tokio::test]
    async fn test_create_job_retries_undecodable_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/job/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/job/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jobId": "job-3"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = JobControlClient::from_config(&partner_config(&server.uri())).unwrap();
        assert_eq!(client.create_job(&job_request(None)).await.unwrap().job_id, "job-3");
    }

    #[tokio::test]
    async fn test_create_job_undecodable_body_exhausts_budget() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/job/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .expect(3)
            .mount(&server)
            .await;

        let client = JobControlClient::from_config(&partner_config(&server.uri())).unwrap();
        let err = client.create_job(&job_request(None)).await.unwrap_err();

        assert!(matches!(err, IngestError::Internal { .. }));
        assert!(err.to_string().contains("<html>gateway</html>"));
    }

    #[tokio::test]
    async fn test_signing_url_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/job/job-1/signing-url"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/job/job-1/signing-url"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"url": "https://upload.example.com/x"})),
            )
            .mount(&server)
            .await;

        let client = JobControlClient::from_config(&partner_config(&server.uri())).unwrap();
        assert_eq!(
            client.signing_url("job-1").await.unwrap(),
            "https://upload.example.com/x"
        );
    }

    #[tokio::test]
    async fn test_signing_url_gives_up_after_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/job/job-1/signing-url"))
            .respond_with(ResponseTemplate::new(502))
            .expect(3)
            .mount(&server)
            .await;

        let client = JobControlClient::from_config(&partner_config(&server.uri())).unwrap();
        assert!(matches!(
            client.signing_url("job-1").await.unwrap_err(),
            IngestError::Http(_)
        ));
    }

    #[tokio::test]
    async fn test_report_failure_posts_to_fail_type_route() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/job/job-1/cancel"))
            .and(body_json(json!({"metadata": {}})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = JobControlClient::from_config(&partner_config(&server.uri())).unwrap();
        let response = client
            .report_failure("job-1", &json!({}), FailType::Cancel)
            .await
            .unwrap();
        assert_eq!(response, Value::Null);
    }

    #[tokio::test]
    async fn test_report_done_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/job/job-1/done"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "accepted"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = JobControlClient::from_config(&partner_config(&server.uri())).unwrap();
        let response = client
            .report_done("job-1", &json!({"job_result": {"status": "ready_for_loading"}}))
            .await
            .unwrap();
        assert_eq!(response["status"], "accepted");
    }
}
