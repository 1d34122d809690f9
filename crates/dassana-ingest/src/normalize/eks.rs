//! EKS control-plane logs delivered through a CloudWatch Logs subscription
//!
//! The payload is base64 text wrapping a gzipped JSON document with a
//! `logEvents` array. Messages that are themselves JSON objects are
//! unwrapped and stamped with the event `timestamp`; anything else is kept
//! as the raw event.

use super::Normalizer;
use crate::error::{IngestError, Result};
use base64::Engine;
use serde_json::Value;

#[derive(Debug, Default)]
pub struct EksNormalizer {
    records: Vec<Value>,
}

impl EksNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn unwrap_event(event: Value) -> Value {
        let parsed = event
            .get("message")
            .and_then(Value::as_str)
            .and_then(|message| serde_json::from_str::<Value>(message).ok());

        match parsed {
            Some(Value::Object(mut message)) => {
                let timestamp = event.get("timestamp").cloned().unwrap_or(Value::Null);
                message.insert("timestamp".to_string(), timestamp);
                Value::Object(message)
            },
            _ => event,
        }
    }
}

impl Normalizer for EksNormalizer {
    fn name(&self) -> &'static str {
        "aws_eks"
    }

    fn push(&mut self, content: &[u8]) -> Result<bool> {
        let encoded: Vec<u8> = content
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        let compressed = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| IngestError::parse(format!("EKS payload is not base64: {}", e)))?;
        let raw = dassana_common::compression::decompress_gzip(&compressed)?;
        let mut document: Value = serde_json::from_slice(&raw)?;

        match document.get_mut("logEvents").map(Value::take) {
            Some(Value::Array(events)) => {
                self.records
                    .extend(events.into_iter().map(Self::unwrap_event));
            },
            _ => return Err(IngestError::parse("EKS payload has no logEvents array")),
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

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use dassana_common::compression::gzip_bytes;
    use serde_json::json;

    fn encode(document: &Value) -> Vec<u8> {
        let compressed = gzip_bytes(document.to_string().as_bytes()).unwrap();
        base64::engine::general_purpose::STANDARD
            .encode(compressed)
            .into_bytes()
    }

    #[test]
    fn test_json_messages_are_unwrapped() {
        let document = json!({
            "logGroup": "/aws/eks/cluster/cluster",
            "logEvents": [
                {"id": "1", "timestamp": 1700000000000i64, "message": "{\"kind\":\"Event\",\"verb\":\"get\"}"},
                {"id": "2", "timestamp": 1700000000001i64, "message": "I1118 plain klog line"},
                {"id": "3", "timestamp": 1700000000002i64, "message": "42"}
            ]
        });
        let mut normalizer = EksNormalizer::new();
        normalizer.push(&encode(&document)).unwrap();

        let records = normalizer.drain();
        assert_eq!(
            records[0],
            json!({"kind": "Event", "verb": "get", "timestamp": 1700000000000i64})
        );
        assert_eq!(records[1]["message"], json!("I1118 plain klog line"));
        assert_eq!(records[2]["id"], json!("3"));
    }

    #[test]
    fn test_invalid_base64() {
        let mut normalizer = EksNormalizer::new();
        assert!(matches!(
            normalizer.push(b"***").unwrap_err(),
            IngestError::Parse(_)
        ));
    }
}
