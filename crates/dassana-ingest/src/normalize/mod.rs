//! Cloud log normalizers
//!
//! A normalizer takes one raw content unit (an S3 object body, a CloudWatch
//! subscription payload, a config event) and buffers the JSON records it
//! contains. The writer drains the buffer with [`Normalizer::drain`], or the
//! caller does it through [`crate::IngestionWriter::write_all`].
//!
//! | app id | normalizer |
//! |---|---|
//! | `aws_cloudtrail` | [`CloudTrailNormalizer`] |
//! | `aws_vpc_flow` | [`VpcFlowNormalizer`] |
//! | `aws_alb` | [`AlbNormalizer`] |
//! | `aws_waf` | [`WafNormalizer`] |
//! | `aws_s3_access` | [`S3AccessNormalizer`] |
//! | `aws_route53_query` | [`Route53QueryNormalizer`] |
//! | `aws_network_firewall` | [`NetworkFirewallNormalizer`] |
//! | `azure_test` | [`AzureActivityNormalizer`] |
//! | `aws_eks` | [`EksNormalizer`] |
//!
//! AWS Config payloads are picked separately with [`config_normalizer`].

pub mod alb;
pub mod aws_config;
pub mod azure_activity;
pub mod cloudtrail;
pub mod eks;
pub mod json_lines;
pub mod s3_access;
pub mod tokenizer;
pub mod vpc_flow;
pub mod waf;

pub use alb::AlbNormalizer;
pub use aws_config::{ConfigChangeNormalizer, ConfigSnapshotNormalizer};
pub use azure_activity::AzureActivityNormalizer;
pub use cloudtrail::CloudTrailNormalizer;
pub use eks::EksNormalizer;
pub use json_lines::{NetworkFirewallNormalizer, Route53QueryNormalizer};
pub use s3_access::S3AccessNormalizer;
pub use vpc_flow::VpcFlowNormalizer;
pub use waf::WafNormalizer;

use crate::config::Config;
use crate::error::{IngestError, Result};
use serde_json::{Map, Number, Value};

pub trait Normalizer: Send {
    /// App id this normalizer serves.
    fn name(&self) -> &'static str;

    /// Whether the caller should skip the object stored under `key`.
    fn exclude(&self, _key: &str) -> bool {
        false
    }

    /// Parse one content unit into the buffer. Returns `true` when the
    /// caller should flush now.
    fn push(&mut self, content: &[u8]) -> Result<bool>;

    fn records(&self) -> &[Value];

    fn records_mut(&mut self) -> &mut Vec<Value>;

    /// Take every buffered record, oldest first.
    fn drain(&mut self) -> Vec<Value> {
        std::mem::take(self.records_mut())
    }

    fn len(&self) -> usize {
        self.records().len()
    }

    fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

/// Normalizer for a log app id.
pub fn for_app_id(app_id: &str) -> Result<Box<dyn Normalizer>> {
    let normalizer: Box<dyn Normalizer> = match app_id {
        "aws_cloudtrail" => Box::new(CloudTrailNormalizer::new()),
        "aws_vpc_flow" => Box::new(VpcFlowNormalizer::new()),
        "aws_alb" => Box::new(AlbNormalizer::new()),
        "aws_waf" => Box::new(WafNormalizer::new()),
        "aws_s3_access" => Box::new(S3AccessNormalizer::new()),
        "aws_route53_query" => Box::new(Route53QueryNormalizer::new()),
        "aws_network_firewall" => Box::new(NetworkFirewallNormalizer::new()),
        "azure_test" => Box::new(AzureActivityNormalizer::new()),
        "aws_eks" => Box::new(EksNormalizer::new()),
        other => {
            return Err(IngestError::config(format!(
                "No normalizer for app id '{}'",
                other
            )))
        },
    };
    Ok(normalizer)
}

/// Normalizer for the configured `DASSANA_APP_ID`.
pub fn from_config(config: &Config) -> Result<Box<dyn Normalizer>> {
    for_app_id(config.app_id()?)
}

/// Snapshot normalizer for one-time collection, change normalizer otherwise.
pub fn config_normalizer(one_time: bool) -> Box<dyn Normalizer> {
    if one_time {
        Box::new(ConfigSnapshotNormalizer::new())
    } else {
        Box::new(ConfigChangeNormalizer::new())
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Placeholder the AWS text formats use for an empty value. Never cast.
pub(crate) const EMPTY_FIELD: &str = "-";

pub(crate) fn gunzip_text(content: &[u8]) -> Result<String> {
    let raw = dassana_common::compression::decompress_gzip(content)?;
    String::from_utf8(raw).map_err(|e| IngestError::parse(format!("Log content is not UTF-8: {}", e)))
}

pub(crate) fn utf8_text(content: &[u8]) -> Result<&str> {
    std::str::from_utf8(content).map_err(|e| IngestError::parse(format!("Log content is not UTF-8: {}", e)))
}

/// Numeric value of `raw`, integer when it fits. Processing times in some
/// formats are fractional.
pub(crate) fn cast_number(field: &str, raw: &str) -> Result<Value> {
    if raw == EMPTY_FIELD {
        return Ok(Value::String(raw.to_string()));
    }
    if let Ok(int) = raw.parse::<i64>() {
        return Ok(Value::Number(int.into()));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| IngestError::parse(format!("Field '{}' is not numeric: '{}'", field, raw)))
}

/// Zip a fixed field table with parsed values, casting through `cast`.
/// Extra values are dropped and missing ones leave their fields absent.
pub(crate) fn build_record<F>(fields: &[&str], values: Vec<String>, cast: F) -> Result<Value>
where
    F: Fn(&str, String) -> Result<Value>,
{
    let mut record = Map::new();
    for (field, value) in fields.iter().zip(values) {
        let value = if value == EMPTY_FIELD {
            Value::String(value)
        } else {
            cast(field, value)?
        };
        record.insert((*field).to_string(), value);
    }
    Ok(Value::Object(record))
}
