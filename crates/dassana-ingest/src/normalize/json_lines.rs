//! Gzipped NDJSON formats: Route 53 resolver query logs and Network Firewall
//! logs

use super::{gunzip_text, Normalizer};
use crate::error::{IngestError, Result};
use serde_json::Value;

fn parse_lines(content: &[u8]) -> Result<Vec<Value>> {
    gunzip_text(content)?
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(IngestError::from))
        .collect()
}

#[derive(Debug, Default)]
pub struct Route53QueryNormalizer {
    records: Vec<Value>,
}

impl Route53QueryNormalizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Normalizer for Route53QueryNormalizer {
    fn name(&self) -> &'static str {
        "aws_route53_query"
    }

    fn push(&mut self, content: &[u8]) -> Result<bool> {
        self.records.extend(parse_lines(content)?);
        Ok(false)
    }

    fn records(&self) -> &[Value] {
        &self.records
    }

    fn records_mut(&mut self) -> &mut Vec<Value> {
        &mut self.records
    }
}

#[derive(Debug, Default)]
pub struct NetworkFirewallNormalizer {
    records: Vec<Value>,
}

impl NetworkFirewallNormalizer {
    pub fn new() -> Self {
        Self::default()
    }
}

/// `event_timestamp` arrives as a string of epoch seconds.
fn timestamp_as_integer(value: &Value) -> Result<i64> {
    let parsed = match value {
        Value::String(raw) => raw.trim().parse::<i64>().ok(),
        Value::Number(number) => number.as_i64().or_else(|| number.as_f64().map(|f| f.trunc() as i64)),
        _ => None,
    };
    parsed.ok_or_else(|| IngestError::parse(format!("Invalid event_timestamp: {}", value)))
}

impl Normalizer for NetworkFirewallNormalizer {
    fn name(&self) -> &'static str {
        "aws_network_firewall"
    }

    fn push(&mut self, content: &[u8]) -> Result<bool> {
        for mut record in parse_lines(content)? {
            let stamp = record
                .get("event_timestamp")
                .ok_or_else(|| IngestError::parse("Network Firewall record has no event_timestamp"))?;
            let stamp = timestamp_as_integer(stamp)?;
            record["event_timestamp"] = Value::from(stamp);
            self.records.push(record);
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
