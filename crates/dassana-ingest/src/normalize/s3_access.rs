//! S3 server access logs (plain text)

use super::tokenizer::split_fields;
use super::{build_record, cast_number, utf8_text, Normalizer};
use crate::error::{IngestError, Result};
use chrono::NaiveDateTime;
use serde_json::Value;

pub const FIELDS: &[&str] = &[
    "bucket_owner",
    "bucket",
    "time",
    "remote_ip",
    "requestor",
    "request_id",
    "operation",
    "key",
    "request_uri",
    "http_status",
    "error_code",
    "bytes_sent",
    "object_size",
    "total_time",
    "turn_around_time",
    "referer",
    "user_agent",
    "version_id",
    "host_id",
    "signature_version",
    "cipher_suite",
    "authentication_type",
    "host_header",
    "tls_version",
    "access_point_arn",
];

const NUMERIC_FIELDS: &[&str] = &[
    "http_status",
    "error_code",
    "bytes_sent",
    "object_size",
    "total_time",
    "turn_around_time",
];

const TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S";

/// `[06/Feb/2019:00:00:38 +0000]` to epoch milliseconds. The offset is
/// ignored; S3 always logs UTC.
pub fn access_time_millis(raw: &str) -> Result<i64> {
    let stamp = raw
        .trim_matches(|c| c == '[' || c == ']')
        .split(' ')
        .next()
        .unwrap_or_default();
    NaiveDateTime::parse_from_str(stamp, TIME_FORMAT)
        .map(|time| time.and_utc().timestamp_millis())
        .map_err(|e| IngestError::parse(format!("Invalid access log time '{}': {}", raw, e)))
}

#[derive(Debug, Default)]
pub struct S3AccessNormalizer {
    records: Vec<Value>,
}

impl S3AccessNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_line(line: &str) -> Result<Value> {
        build_record(FIELDS, split_fields(line)?, |field, value| {
            if field == "time" {
                Ok(Value::from(access_time_millis(&value)?))
            } else if NUMERIC_FIELDS.contains(&field) {
                cast_number(field, &value)
            } else {
                Ok(Value::String(value))
            }
        })
    }
}

impl Normalizer for S3AccessNormalizer {
    fn name(&self) -> &'static str {
        "aws_s3_access"
    }

    fn push(&mut self, content: &[u8]) -> Result<bool> {
        for line in utf8_text(content)?.lines().filter(|line| !line.is_empty()) {
            self.records.push(Self::parse_line(line)?);
        }
        Ok(false)
    }

    fn records(&self) -> &[Value] {
        &self.records
    }

    fn records_mut(&mut self) -> &mut Vec<Value> {
        &mut self.records
    }
}
