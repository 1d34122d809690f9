//! AWS Config payloads
//!
//! Snapshots are buffered whole and ask for a flush once roughly 0.1 MiB of
//! JSON has accumulated. Change notifications arrive as SQS messages whose
//! `body` wraps an SNS envelope whose `Message` is the configuration item.

use super::Normalizer;
use crate::error::{IngestError, Result};
use serde_json::Value;

/// Serialized bytes after which a snapshot push signals a flush
/// (0.1 * 1 MiB, rounded up).
pub const SNAPSHOT_FLUSH_BYTES: u64 = 104_858;

#[derive(Debug, Default)]
pub struct ConfigSnapshotNormalizer {
    records: Vec<Value>,
    bytes_so_far: u64,
}

impl ConfigSnapshotNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer an already-parsed snapshot item.
    pub fn push_record(&mut self, record: Value) -> Result<bool> {
        self.bytes_so_far += serde_json::to_vec(&record)?.len() as u64;
        self.records.push(record);

        if self.bytes_so_far >= SNAPSHOT_FLUSH_BYTES {
            self.bytes_so_far = 0;
            return Ok(true);
        }
        Ok(false)
    }
}

impl Normalizer for ConfigSnapshotNormalizer {
    fn name(&self) -> &'static str {
        "aws_config_snapshot"
    }

    fn push(&mut self, content: &[u8]) -> Result<bool> {
        self.push_record(serde_json::from_slice(content)?)
    }

    fn records(&self) -> &[Value] {
        &self.records
    }

    fn records_mut(&mut self) -> &mut Vec<Value> {
        &mut self.records
    }
}

#[derive(Debug, Default)]
pub struct ConfigChangeNormalizer {
    records: Vec<Value>,
}

/// Embedded JSON may arrive as a string or already decoded.
fn decode_embedded(value: &Value, what: &str) -> Result<Value> {
    match value {
        Value::String(raw) => serde_json::from_str(raw)
            .map_err(|e| IngestError::parse(format!("Invalid JSON in {}: {}", what, e))),
        Value::Null => Err(IngestError::parse(format!("Missing {}", what))),
        other => Ok(other.clone()),
    }
}

impl ConfigChangeNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer every configuration item carried by an already-parsed batch.
    pub fn push_payload(&mut self, payload: &Value) -> Result<()> {
        let items = payload
            .get("Records")
            .and_then(Value::as_array)
            .ok_or_else(|| IngestError::parse("Config change payload has no Records array"))?;

        for item in items {
            let body = decode_embedded(&item["body"], "Records[].body")?;
            let message = decode_embedded(&body["Message"], "body.Message")?;
            self.records.push(message);
        }
        Ok(())
    }
}

impl Normalizer for ConfigChangeNormalizer {
    fn name(&self) -> &'static str {
        "aws_config_change"
    }

    fn push(&mut self, content: &[u8]) -> Result<bool> {
        let payload: Value = serde_json::from_slice(content)?;
        self.push_payload(&payload)?;
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
    use serde_json::json;

    #[test]
    fn test_snapshot_signals_flush_at_threshold() {
        let mut normalizer = ConfigSnapshotNormalizer::new();
        let item = json!({"configuration": "x".repeat(50_000)});

        assert!(!normalizer.push_record(item.clone()).unwrap());
        assert!(!normalizer.push_record(item.clone()).unwrap());
        assert!(normalizer.push_record(item.clone()).unwrap());
        assert!(!normalizer.push_record(item).unwrap());
        assert_eq!(normalizer.len(), 4);
    }

    #[test]
    fn test_snapshot_push_bytes() {
        let mut normalizer = ConfigSnapshotNormalizer::new();
        assert!(!normalizer.push(b"{\"resourceType\":\"AWS::S3::Bucket\"}").unwrap());
        assert_eq!(normalizer.records()[0]["resourceType"], "AWS::S3::Bucket");
    }

    #[test]
    fn test_change_unwraps_body_and_message() {
        let item = json!({"configurationItem": {"resourceId": "i-123"}});
        let envelope = json!({"Type": "Notification", "Message": item.to_string()});
        let payload = json!({"Records": [{"messageId": "m-1", "body": envelope.to_string()}]});

        let mut normalizer = ConfigChangeNormalizer::new();
        assert!(!normalizer.push(payload.to_string().as_bytes()).unwrap());
        assert_eq!(normalizer.drain(), vec![item]);
    }

    #[test]
    fn test_change_missing_message() {
        let payload = json!({"Records": [{"body": "{\"Type\":\"Notification\"}"}]});
        let mut normalizer = ConfigChangeNormalizer::new();
        assert!(matches!(
            normalizer.push_payload(&payload).unwrap_err(),
            IngestError::Parse(_)
        ));
    }
}
