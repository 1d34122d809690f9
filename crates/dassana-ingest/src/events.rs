//! Job status events
//!
//! Each lifecycle transition of a writer produces one [`JobEvent`], rendered
//! twice: a developer context with counters and error details, logged
//! through `tracing`, and a customer-facing context that hides internal
//! failure details.

use crate::error::IngestError;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{error, info};
use uuid::Uuid;

/// Connector name to reporting scope.
const SCOPE_IDS: &[(&str, &str)] = &[
    ("crowdstrike_edr", "detection"),
    ("crowdstrike_spotlight", "vulnerability"),
    ("tenable_vulnerability", "vulnerability"),
    ("snyk_vulnerability", "vulnerability"),
    ("prisma_cloud_cspm", "cspm"),
    ("prisma_cloud_cwpp", "vulnerability"),
    ("qualys_vulnerability", "vulnerability"),
    ("wiz_cwpp", "vulnerability"),
    ("wiz_cspm", "cspm"),
    ("prisma_cloud_security_group", "asset"),
    ("prisma_cloud_instance", "asset"),
    ("carbon_black_vulnerability", "vulnerability"),
    ("ms_defender_endpoint_alert", "detection"),
    ("ms_defender_endpoint_vulnerability", "vulnerability"),
];

const INTERNAL_FAILURE_MESSAGE: &str = "Job terminated due to internal error";

pub fn scope_for(connector: &str) -> Option<&'static str> {
    SCOPE_IDS
        .iter()
        .find(|(name, _)| *name == connector)
        .map(|(_, scope)| *scope)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    InProgress,
    ReadyForLoading,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::InProgress => "in_progress",
            JobStatus::ReadyForLoading => "ready_for_loading",
            JobStatus::Failed => "failed",
        }
    }

    fn message(self) -> &'static str {
        match self {
            JobStatus::InProgress => "starting data collection",
            JobStatus::ReadyForLoading => "successfully finished data collection",
            JobStatus::Failed => "failed to finish data collection",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub event_id: Uuid,
    pub timestamp: String,
    pub connector: String,
    pub status: JobStatus,
    pub level: &'static str,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<String>,
}

impl JobEvent {
    pub fn new(connector: &str, status: JobStatus) -> Self {
        let level = match status {
            JobStatus::Failed => "error",
            JobStatus::InProgress | JobStatus::ReadyForLoading => "info",
        };
        Self {
            event_id: Uuid::new_v4(),
            timestamp: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            connector: connector.to_string(),
            status,
            level,
            message: status.message(),
            job_id: None,
            connection_id: None,
            scope_id: scope_for(connector).map(str::to_string),
        }
    }

    pub fn with_job(mut self, job_id: &str) -> Self {
        self.job_id = Some(job_id.to_string());
        self
    }

    pub fn with_connection(mut self, config_id: &str) -> Self {
        self.connection_id = Some(config_id.to_string());
        self
    }

    fn base(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Full detail for operators.
    pub fn developer_context(&self, summary: Option<&JobSummary>, error: Option<&IngestError>) -> Value {
        let mut ctx = self.base();

        if let Some(summary) = summary {
            ctx.insert("pass".into(), json!(summary.pass));
            ctx.insert("fail".into(), json!(summary.fail));
            ctx.insert("debugLog".into(), json!(summary.debug_log));
        }

        if self.status == JobStatus::Failed {
            let details = match error {
                Some(err) => {
                    let kind = err.kind();
                    let code = if kind.is_internal() {
                        "internal_error"
                    } else {
                        kind.error_code()
                    };
                    json!({
                        "errorCode": code,
                        "errorMessage": err.to_string(),
                        "isInternal": kind.is_internal(),
                        "isAutoRecoverable": false,
                    })
                },
                None => json!({
                    "errorCode": "internal_error",
                    "errorMessage": "unknown failure",
                    "isInternal": true,
                    "isAutoRecoverable": false,
                }),
            };
            ctx.insert("errorDetails".into(), details);
        }

        Value::Object(ctx)
    }

    /// What the customer sees: `ok` on success, a generic message for
    /// internal failures.
    pub fn customer_context(
        &self,
        tenant_id: Option<&str>,
        site_id: Option<&str>,
        error: Option<&IngestError>,
    ) -> Value {
        let mut ctx = self.base();
        let status = match self.status {
            JobStatus::ReadyForLoading => "ok",
            other => other.as_str(),
        };
        ctx.insert("status".into(), json!(status));
        ctx.insert("tenantId".into(), json!(tenant_id));
        ctx.insert("siteId".into(), json!(site_id));

        if self.status == JobStatus::Failed {
            let message = match error {
                Some(err) if !err.kind().is_internal() => err.failure_reason(),
                _ => INTERNAL_FAILURE_MESSAGE.to_string(),
            };
            ctx.insert("errorDetails".into(), json!({ "message": message }));
        }

        Value::Object(ctx)
    }
}

/// Counters attached to terminal events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSummary {
    pub pass: u64,
    pub fail: u64,
    pub debug_log: Vec<String>,
}

/// Emits events for one connector run
#[derive(Debug, Clone, Default)]
pub struct EventReporter {
    tenant_id: Option<String>,
    site_id: Option<String>,
}

impl EventReporter {
    pub fn new(tenant_id: Option<String>, site_id: Option<String>) -> Self {
        Self { tenant_id, site_id }
    }

    pub fn emit(&self, event: &JobEvent, summary: Option<&JobSummary>, err: Option<&IngestError>) -> Value {
        let developer = event.developer_context(summary, err);
        let customer = event.customer_context(self.tenant_id.as_deref(), self.site_id.as_deref(), err);

        match event.status {
            JobStatus::Failed => error!(
                event_id = %event.event_id,
                connector = %event.connector,
                context = %developer,
                "{}",
                event.message
            ),
            JobStatus::InProgress | JobStatus::ReadyForLoading => info!(
                event_id = %event.event_id,
                connector = %event.connector,
                context = %developer,
                "{}",
                event.message
            ),
        }

        customer
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_mapping() {
        assert_eq!(scope_for("wiz_cspm"), Some("cspm"));
        assert_eq!(scope_for("aws_cloudtrail"), None);
    }

    #[test]
    fn test_event_shape() {
        let event = JobEvent::new("crowdstrike_edr", JobStatus::InProgress)
            .with_job("job-1")
            .with_connection("cfg-1");
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["status"], "in_progress");
        assert_eq!(value["level"], "info");
        assert_eq!(value["message"], "starting data collection");
        assert_eq!(value["jobId"], "job-1");
        assert_eq!(value["connectionId"], "cfg-1");
        assert_eq!(value["scopeId"], "detection");
        assert!(value["timestamp"].as_str().unwrap().ends_with('Z'));
        assert!(Uuid::parse_str(value["eventId"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_success_customer_status_is_ok() {
        let event = JobEvent::new("aws_alb", JobStatus::ReadyForLoading);
        let ctx = EventReporter::new(Some("t-1".into()), Some("s-1".into())).emit(&event, None, None);
        assert_eq!(ctx["status"], "ok");
        assert_eq!(ctx["tenantId"], "t-1");
        assert_eq!(ctx["siteId"], "s-1");
        assert!(ctx.get("errorDetails").is_none());
    }

    #[test]
    fn test_internal_failure_is_hidden_from_customer() {
        let event = JobEvent::new("aws_alb", JobStatus::Failed);
        let err = IngestError::internal("upload", "stack details");

        let customer = event.customer_context(None, None, Some(&err));
        assert_eq!(customer["errorDetails"]["message"], INTERNAL_FAILURE_MESSAGE);

        let developer = event.developer_context(None, Some(&err));
        assert_eq!(developer["errorDetails"]["errorCode"], "internal_error");
        assert!(developer["errorDetails"]["errorMessage"]
            .as_str()
            .unwrap()
            .contains("stack details"));
    }

    #[test]
    fn test_external_failure_reaches_customer() {
        let event = JobEvent::new("aws_alb", JobStatus::Failed);
        let err = IngestError::external("API key revoked");
        let summary = JobSummary {
            pass: 3,
            fail: 1,
            debug_log: vec!["x".into()],
        };

        let customer = event.customer_context(None, None, Some(&err));
        assert_eq!(customer["errorDetails"]["message"], "API key revoked");

        let developer = event.developer_context(Some(&summary), Some(&err));
        assert_eq!(developer["pass"], 3);
        assert_eq!(developer["errorDetails"]["isInternal"], false);
    }
}
