//! Temporary AWS credentials from STS AssumeRole
//!
//! A session is reused until it is within [`REFRESH_MARGIN_SECS`] of its
//! expiration, then replaced by a fresh AssumeRole call.

use crate::error::{IngestError, Result};
use crate::retry::{with_retry, RetryPolicy};
use crate::upload::{is_transient_sdk_error, sdk_failure, AssumeRole};
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_sts::config::Region;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

/// Sessions closer than this to expiry are refreshed before use.
pub const REFRESH_MARGIN_SECS: i64 = 120;

#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: DateTime<Utc>,
}

impl std::fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

impl SessionCredentials {
    /// Credentials for an SDK client, carrying the session token.
    pub fn to_sdk(&self, provider_name: &'static str) -> Credentials {
        Credentials::new(
            &self.access_key_id,
            &self.secret_access_key,
            Some(self.session_token.clone()),
            Some(self.expiration.into()),
            provider_name,
        )
    }
}

#[async_trait]
pub trait RoleAssumer: Send + Sync {
    async fn assume_role(&self) -> Result<SessionCredentials>;
}

/// AssumeRole through STS, authenticated with the stage's static keys
pub struct StsRoleAssumer {
    client: aws_sdk_sts::Client,
    role: AssumeRole,
    session_name: String,
    retry: RetryPolicy,
}

impl StsRoleAssumer {
    pub fn new(
        access_key: &str,
        secret_key: &str,
        region: &str,
        role: &AssumeRole,
        job_id: &str,
        retry: RetryPolicy,
    ) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "dassana-stage");
        let config = aws_sdk_sts::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(region.to_string()))
            .build();

        Self {
            client: aws_sdk_sts::Client::from_conf(config),
            role: role.clone(),
            session_name: session_name(job_id),
            retry,
        }
    }
}

/// Role session names allow `[\w+=,.@-]` and at most 64 characters.
fn session_name(job_id: &str) -> String {
    let cleaned: String = job_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || "+=,.@-_".contains(c) { c } else { '-' })
        .collect();
    let mut name = format!("dassana-ingest-{}", cleaned);
    name.truncate(64);
    name
}

#[async_trait]
impl RoleAssumer for StsRoleAssumer {
    async fn assume_role(&self) -> Result<SessionCredentials> {
        let this = self;
        let output = with_retry(&self.retry, "sts_assume_role", move || async move {
            this.client
                .assume_role()
                .role_arn(&this.role.role_arn)
                .role_session_name(&this.session_name)
                .set_external_id(this.role.external_id.clone())
                .send()
                .await
                .map_err(|e| {
                    let transient = is_transient_sdk_error(&e);
                    sdk_failure(
                        "STS",
                        format!("AssumeRole {} failed: {}", this.role.role_arn, e),
                        transient,
                    )
                })
        })
        .await
        .map_err(IngestError::into_stage_write)?;

        let credentials = output.credentials().ok_or_else(|| {
            IngestError::stage_write(format!("AssumeRole {} returned no credentials", self.role.role_arn))
        })?;
        let expiration = DateTime::from_timestamp(credentials.expiration().secs(), 0)
            .ok_or_else(|| IngestError::stage_write("AssumeRole returned an invalid expiration"))?;

        info!(role_arn = %self.role.role_arn, %expiration, "Assumed stage role");
        Ok(SessionCredentials {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
            expiration,
        })
    }
}

pub struct SessionCache {
    assumer: Box<dyn RoleAssumer>,
    current: Option<SessionCredentials>,
    margin: Duration,
}

impl SessionCache {
    pub fn new(assumer: Box<dyn RoleAssumer>) -> Self {
        Self {
            assumer,
            current: None,
            margin: Duration::seconds(REFRESH_MARGIN_SECS),
        }
    }

    pub async fn credentials(&mut self) -> Result<SessionCredentials> {
        self.credentials_at(Utc::now()).await
    }

    /// Cached session if more than the margin remains at `now`.
    pub async fn credentials_at(&mut self, now: DateTime<Utc>) -> Result<SessionCredentials> {
        if let Some(current) = &self.current {
            if current.expiration - now > self.margin {
                return Ok(current.clone());
            }
            debug!(expiration = %current.expiration, "Stage session near expiry, refreshing");
        }

        let fresh = self.assumer.assume_role().await?;
        self.current = Some(fresh.clone());
        Ok(fresh)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct CountingAssumer {
        calls: Arc<AtomicU32>,
        expiration: DateTime<Utc>,
    }

    #[async_trait]
    impl RoleAssumer for CountingAssumer {
        async fn assume_role(&self) -> Result<SessionCredentials> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(SessionCredentials {
                access_key_id: format!("ASIA{}", n),
                secret_access_key: "secret".to_string(),
                session_token: "token".to_string(),
                expiration: self.expiration + Duration::hours(i64::from(n - 1)),
            })
        }
    }

    fn cache(expiration: DateTime<Utc>) -> (SessionCache, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let assumer = CountingAssumer {
            calls: Arc::clone(&calls),
            expiration,
        };
        (SessionCache::new(Box::new(assumer)), calls)
    }

    #[tokio::test]
    async fn test_reuses_session_outside_margin() {
        let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let (mut cache, calls) = cache(start + Duration::hours(1));

        let first = cache.credentials_at(start).await.unwrap();
        let second = cache.credentials_at(start + Duration::minutes(57)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refreshes_once_inside_margin() {
        let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let (mut cache, calls) = cache(start + Duration::hours(1));

        cache.credentials_at(start).await.unwrap();
        let near_expiry = start + Duration::minutes(58) + Duration::seconds(30);
        let refreshed = cache.credentials_at(near_expiry).await.unwrap();
        let again = cache.credentials_at(near_expiry).await.unwrap();

        assert_eq!(refreshed.access_key_id, "ASIA2");
        assert_eq!(again, refreshed);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_session_name_is_sanitized() {
        assert_eq!(session_name("job 1/2"), "dassana-ingest-job-1-2");
        assert!(session_name(&"x".repeat(100)).len() <= 64);
    }

    #[test]
    fn test_debug_hides_secret() {
        let creds = SessionCredentials {
            access_key_id: "ASIA1".to_string(),
            secret_access_key: "very-secret".to_string(),
            session_token: "token".to_string(),
            expiration: Utc::now(),
        };
        assert!(!format!("{:?}", creds).contains("very-secret"));
    }
}
