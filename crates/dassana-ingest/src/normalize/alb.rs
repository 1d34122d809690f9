//! Application Load Balancer access logs

use super::tokenizer::split_fields;
use super::{build_record, cast_number, gunzip_text, Normalizer};
use crate::error::Result;
use serde_json::Value;

/// Column order of an ALB access log entry. `classificaton_reason` is the
/// key downstream consumers already index on.
pub const FIELDS: &[&str] = &[
    "type",
    "time",
    "elb",
    "client_port",
    "target_port",
    "request_processing_time",
    "target_processing_time",
    "response_processing_time",
    "elb_status_code",
    "target_status_code",
    "received_bytes",
    "sent_bytes",
    "request",
    "user_agent",
    "ssl_cipher",
    "ssl_protocol",
    "target_group_arn",
    "trace_id",
    "domain_name",
    "chosen_cert_name",
    "matched_rule_priority",
    "request_creation_time",
    "actions_executed",
    "redirect_url",
    "error_reason",
    "target_port_list",
    "target_status_code_list",
    "classification",
    "classificaton_reason",
];

const NUMERIC_FIELDS: &[&str] = &[
    "request_processing_time",
    "target_processing_time",
    "response_processing_time",
    "elb_status_code",
    "target_status_code",
    "received_bytes",
    "sent_bytes",
    "matched_rule_priority",
];

#[derive(Debug, Default)]
pub struct AlbNormalizer {
    records: Vec<Value>,
}

impl AlbNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_line(line: &str) -> Result<Value> {
        build_record(FIELDS, split_fields(line)?, |field, value| {
            if NUMERIC_FIELDS.contains(&field) {
                cast_number(field, &value)
            } else {
                Ok(Value::String(value))
            }
        })
    }
}

impl Normalizer for AlbNormalizer {
    fn name(&self) -> &'static str {
        "aws_alb"
    }

    fn push(&mut self, content: &[u8]) -> Result<bool> {
        let text = gunzip_text(content)?;
        for line in text.lines().filter(|line| !line.is_empty()) {
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
