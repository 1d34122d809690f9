//! Bearer credentials for the control plane
//!
//! Internal mode exchanges client credentials for an OAuth token and caches
//! it; partner mode hands out the configured static token without touching
//! the network.

use crate::api::endpoints;
use crate::config::{AuthMode, Config};
use crate::error::{IngestError, Result};
use crate::retry::{with_retry, RetryPolicy};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Header carrying the tenant id in internal mode.
pub const TENANT_HEADER: &str = "x-dassana-tenant-id";

/// Lifetime assumed for tokens whose response omits `expires_in`.
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(300);

/// Tokens are renewed this long before they expire.
const TOKEN_EXPIRY_SKEW: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    token: String,
    renew_at: Instant,
}

pub struct AuthClient {
    http: reqwest::Client,
    auth_url: String,
    mode: AuthMode,
    retry: RetryPolicy,
    cache: Mutex<Option<CachedToken>>,
}

impl AuthClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http: crate::api::http_client(&config.auth_url, config.http_timeout)?,
            auth_url: config.auth_url.clone(),
            mode: config.auth.clone(),
            retry: config.retry,
            cache: Mutex::new(None),
        })
    }

    pub fn is_partner(&self) -> bool {
        self.mode.is_partner()
    }

    /// Current bearer token, fetched when the cached one is missing or stale.
    pub async fn access_token(&self) -> Result<String> {
        let (client_id, client_secret) = match &self.mode {
            AuthMode::Partner { token, .. } => return Ok(token.expose().to_string()),
            AuthMode::Internal {
                client_id,
                client_secret,
                ..
            } => (client_id.as_str(), client_secret.expose()),
        };

        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if Instant::now() < cached.renew_at {
                return Ok(cached.token.clone());
            }
        }

        let response = self.fetch_token(client_id, client_secret).await?;
        let ttl = response
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_TTL);
        let token = response.access_token;

        *cache = Some(CachedToken {
            token: token.clone(),
            renew_at: Instant::now() + ttl.saturating_sub(TOKEN_EXPIRY_SKEW),
        });
        Ok(token)
    }

    /// Authorization headers for one control-plane request.
    pub async fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        match &self.mode {
            AuthMode::Partner { token, .. } => {
                headers.insert(AUTHORIZATION, header_value(&format!("Dassana {}", token.expose()))?);
            },
            AuthMode::Internal { tenant_id, .. } => {
                let token = self.access_token().await?;
                headers.insert(TENANT_HEADER, header_value(tenant_id)?);
                headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", token))?);
            },
        }
        Ok(headers)
    }

    #[instrument(skip(self, client_secret))]
    async fn fetch_token(&self, client_id: &str, client_secret: &str) -> Result<TokenResponse> {
        let url = endpoints::token_url(&self.auth_url);
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];
        let (url, form, http) = (&url, &form, &self.http);

        with_retry(&self.retry, "access_token", move || async move {
            let response = http.post(url).form(form).send().await?;
            let status = response.status();

            if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
                let body = response.text().await.unwrap_or_default();
                return Err(IngestError::authentication(
                    format!("Auth service rejected client credentials ({})", status),
                    body,
                ));
            }

            // Any other failure status is an outage, retried as transport error
            let response = response.error_for_status()?;
            let headers = format!("{:?}", response.headers());
            let body = response.text().await?;

            let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
                IngestError::undecodable_response("Failed to get access token", "auth-service", &body, &headers, &e)
            })?;
            debug!(expires_in = ?parsed.expires_in, "Obtained access token");
            Ok(parsed)
        })
        .await
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| IngestError::config(format!("Credential is not a valid header value: {}", e)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::Secret;
    use crate::retry::RetryPolicy;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn internal_config(auth_url: &str) -> Config {
        Config {
            app_url: "https://app.example.com".to_string(),
            ingestion_url: "https://ingest.example.com".to_string(),
            auth_url: auth_url.to_string(),
            auth: AuthMode::Internal {
                client_id: "client-1".to_string(),
                client_secret: Secret::new("secret-1"),
                tenant_id: "tenant-1".to_string(),
            },
            app_id: None,
            partner_client_id: None,
            partner_tenant_id: None,
            debug: false,
            http_timeout: Duration::from_secs(5),
            retry: RetryPolicy::immediate(),
        }
    }

    #[tokio::test]
    async fn test_fetches_and_caches_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=client-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "tok-1", "expires_in": 3600})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let auth = AuthClient::new(&internal_config(&server.uri())).unwrap();
        assert_eq!(auth.access_token().await.unwrap(), "tok-1");
        assert_eq!(auth.access_token().await.unwrap(), "tok-1");

        let headers = auth.headers().await.unwrap();
        assert_eq!(headers.get(TENANT_HEADER).unwrap(), "tenant-1");
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer tok-1");
    }

    #[tokio::test]
    async fn test_unparseable_response_is_internal_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .expect(3)
            .mount(&server)
            .await;

        let auth = AuthClient::new(&internal_config(&server.uri())).unwrap();
        let err = auth.access_token().await.unwrap_err();

        assert!(matches!(err, IngestError::Internal { .. }));
        assert!(err.to_string().contains("<html>maintenance</html>"));
    }

    #[tokio::test]
    async fn test_retries_unavailable_auth_service() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream connect error"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "tok-3"})))
            .expect(1)
            .mount(&server)
            .await;

        let auth = AuthClient::new(&internal_config(&server.uri())).unwrap();
        assert_eq!(auth.access_token().await.unwrap(), "tok-3");
    }

    #[tokio::test]
    async fn test_unavailable_auth_service_gives_up_after_three_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let auth = AuthClient::new(&internal_config(&server.uri())).unwrap();
        let err = auth.access_token().await.unwrap_err();
        assert!(matches!(err, IngestError::Http(_)));
    }

    #[tokio::test]
    async fn test_undecodable_token_body_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "tok-4"})))
            .expect(1)
            .mount(&server)
            .await;

        let auth = AuthClient::new(&internal_config(&server.uri())).unwrap();
        assert_eq!(auth.access_token().await.unwrap(), "tok-4");
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(serde_json::json!({"error": "invalid_client"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let auth = AuthClient::new(&internal_config(&server.uri())).unwrap();
        match auth.access_token().await.unwrap_err() {
            IngestError::Authentication { response, .. } => {
                assert!(response.contains("invalid_client"));
            },
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_partner_mode_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let mut config = internal_config(&server.uri());
        config.auth = AuthMode::Partner {
            partner: "acme".to_string(),
            token: Secret::new("static-token"),
        };

        let auth = AuthClient::new(&config).unwrap();
        assert_eq!(auth.access_token().await.unwrap(), "static-token");
        let headers = auth.headers().await.unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Dassana static-token");
        assert!(headers.get(TENANT_HEADER).is_none());
    }
}
