//! Configuration for the ingestion client
//!
//! Everything is resolved once into a [`Config`] value that is handed to each
//! client. Nothing reads the environment after that point.

use crate::error::{IngestError, Result};
use crate::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY_SECS};
use std::time::Duration;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Auth service used when `DASSANA_AUTH_URL` is not set.
pub const DEFAULT_AUTH_URL: &str = "https://auth.dassana.cloud";

/// Default timeout for HTTP requests in seconds.
/// Can be overridden via DASSANA_HTTP_TIMEOUT_SECS.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 300;

/// Hosts under this DNS suffix are reached without certificate verification.
pub const IN_CLUSTER_SUFFIX: &str = "svc.cluster.local";

/// A credential that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// How requests are authorized. The two modes never mix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// OAuth client-credentials against the auth service
    Internal {
        client_id: String,
        client_secret: Secret,
        tenant_id: String,
    },
    /// Pre-issued static token, no auth round trip
    Partner { partner: String, token: Secret },
}

impl AuthMode {
    pub fn is_partner(&self) -> bool {
        matches!(self, AuthMode::Partner { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// App-manager (control plane) base URL
    pub app_url: String,
    pub ingestion_url: String,
    pub auth_url: String,
    pub auth: AuthMode,
    pub app_id: Option<String>,
    /// Identity attached to partner status events
    pub partner_client_id: Option<String>,
    pub partner_tenant_id: Option<String>,
    pub debug: bool,
    pub http_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Config {
    /// Load `.env` if present, then resolve from the process environment.
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_env()
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through `lookup`, failing on the first missing
    /// required value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| {
                IngestError::config(format!("{} environment variable is not set", key))
            })
        };

        let app_url = normalize_url(&require("DASSANA_APP_URL")?);
        let ingestion_url = normalize_url(&require("DASSANA_INGESTION_URL")?);
        let auth_url = normalize_url(
            &get("DASSANA_AUTH_URL").unwrap_or_else(|| DEFAULT_AUTH_URL.to_string()),
        );

        let auth = match get("DASSANA_PARTNER") {
            Some(partner) => AuthMode::Partner {
                partner,
                token: Secret::new(require("DASSANA_TOKEN")?),
            },
            None => AuthMode::Internal {
                client_id: require("DASSANA_CLIENT_ID")?,
                client_secret: Secret::new(require("DASSANA_CLIENT_SECRET")?),
                tenant_id: require("DASSANA_TENANT_ID")?,
            },
        };

        let http_timeout = Duration::from_secs(parse_number(
            get("DASSANA_HTTP_TIMEOUT_SECS"),
            "DASSANA_HTTP_TIMEOUT_SECS",
            DEFAULT_HTTP_TIMEOUT_SECS,
        )?);
        let retry = RetryPolicy::new(
            parse_number(
                get("DASSANA_RETRY_ATTEMPTS"),
                "DASSANA_RETRY_ATTEMPTS",
                DEFAULT_MAX_ATTEMPTS,
            )?,
            Duration::from_secs(parse_number(
                get("DASSANA_RETRY_DELAY_SECS"),
                "DASSANA_RETRY_DELAY_SECS",
                DEFAULT_RETRY_DELAY_SECS,
            )?),
        );

        Ok(Self {
            app_url,
            ingestion_url,
            auth_url,
            auth,
            app_id: get("DASSANA_APP_ID"),
            partner_client_id: get("DASSANA_PARTNER_CLIENT_ID"),
            partner_tenant_id: get("DASSANA_PARTNER_TENANT_ID"),
            debug: get("DASSANA_DEBUG").is_some_and(|v| is_truthy(&v)),
            http_timeout,
            retry,
        })
    }

    /// Replace the retry policy (tests use [`RetryPolicy::immediate`]).
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn is_partner(&self) -> bool {
        self.auth.is_partner()
    }

    pub fn tenant_id(&self) -> Option<&str> {
        match &self.auth {
            AuthMode::Internal { tenant_id, .. } => Some(tenant_id),
            AuthMode::Partner { .. } => None,
        }
    }

    pub fn app_id(&self) -> Result<&str> {
        self.app_id
            .as_deref()
            .ok_or_else(|| IngestError::config("DASSANA_APP_ID environment variable is not set"))
    }
}

/// Trim trailing slashes and default to https when no scheme is given.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// True when `url` points at an in-cluster service host.
pub fn is_in_cluster(url: &str) -> bool {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.ends_with(IN_CLUSTER_SUFFIX)))
        .unwrap_or(false)
}

fn parse_number<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> Result<T> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| IngestError::config(format!("{} must be a number, got '{}'", key, raw))),
        None => Ok(default),
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
