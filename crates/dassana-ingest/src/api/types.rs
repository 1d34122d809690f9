//! Wire types for the ingestion service and app manager

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /job/`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreateJobRequest {
    pub source: String,
    #[serde(rename = "recordType")]
    pub record_type: String,
    #[serde(rename = "configId")]
    pub config_id: String,
    pub is_snapshot: bool,
    /// Absent means "no preference", which is not the same as `0`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    pub job_id: String,
    #[serde(default)]
    pub stage_details: Option<StageDetails>,
    #[serde(default)]
    pub metadata: Value,
}

/// Where the job's artifacts go. Which fields are present depends on `cloud`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StageDetails {
    #[serde(default)]
    pub cloud: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    /// Either a JSON string or an inline object
    #[serde(default)]
    pub service_account_credentials_json: Option<Value>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub aws_iam_role_arn: Option<String>,
    #[serde(default)]
    pub aws_iam_external_id: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SigningUrlResponse {
    pub url: String,
}

/// Endpoint used to report a failed job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailType {
    Failed,
    Cancel,
}

impl FailType {
    pub fn as_str(self) -> &'static str {
        match self {
            FailType::Failed => "failed",
            FailType::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for FailType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{"job_result": ...}` metadata sent with done/failure reports
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JobMetadata<T> {
    pub job_result: T,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceSummary {
    pub pass: u64,
    pub fail: u64,
    pub debug_log: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SuccessResult {
    pub status: String,
    pub source: SourceSummary,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FailureResult {
    pub failure_reason: String,
    pub status: String,
    pub debug_log: Vec<String>,
    pub pass: u64,
    pub fail: u64,
    pub error_code: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReportBody<'a, M: ?Sized> {
    pub metadata: &'a M,
}

/// Collector run summary posted to the app manager
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub status: String,
    pub time_taken_in_sec: u64,
    pub records_ingested: u64,
    pub ingestion_config_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<Value>,
}
