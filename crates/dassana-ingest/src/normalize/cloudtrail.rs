//! CloudTrail log files: a gzipped JSON document with a `Records` array

use super::{gunzip_text, Normalizer};
use crate::error::{IngestError, Result};
use serde_json::Value;

#[derive(Debug, Default)]
pub struct CloudTrailNormalizer {
    records: Vec<Value>,
}

impl CloudTrailNormalizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Normalizer for CloudTrailNormalizer {
    fn name(&self) -> &'static str {
        "aws_cloudtrail"
    }

    /// Digest files share the trail's prefix but carry no events.
    fn exclude(&self, key: &str) -> bool {
        key.to_lowercase().contains("digest")
    }

    fn push(&mut self, content: &[u8]) -> Result<bool> {
        let document: Value = serde_json::from_str(&gunzip_text(content)?)?;
        match document {
            Value::Object(mut map) => match map.remove("Records") {
                Some(Value::Array(records)) => self.records.extend(records),
                _ => return Err(IngestError::parse("CloudTrail log has no Records array")),
            },
            _ => return Err(IngestError::parse("CloudTrail log is not a JSON object")),
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

    #[test]
    fn test_records_pass_through() {
        let body = json!({"Records": [
            {"eventName": "ConsoleLogin", "eventTime": "2023-01-01T00:00:00Z"},
            {"eventName": "PutObject"}
        ]});
        let mut normalizer = CloudTrailNormalizer::new();
        let flush = normalizer
            .push(&gzip_bytes(body.to_string().as_bytes()).unwrap())
            .unwrap();

        assert!(!flush);
        assert_eq!(normalizer.records().len(), 2);
        assert_eq!(normalizer.records()[1]["eventName"], "PutObject");
    }

    #[test]
    fn test_exclude_digest_keys() {
        let normalizer = CloudTrailNormalizer::new();
        assert!(normalizer.exclude("AWSLogs/123/CloudTrail-Digest/us-east-1/file.json.gz"));
        assert!(!normalizer.exclude("AWSLogs/123/CloudTrail/us-east-1/file.json.gz"));
    }

    #[test]
    fn test_missing_records_is_parse_error() {
        let mut normalizer = CloudTrailNormalizer::new();
        let err = normalizer
            .push(&gzip_bytes(b"{\"other\": []}").unwrap())
            .unwrap_err();
        assert!(matches!(err, IngestError::Parse(_)));
    }
}
