//! Azure Activity logs: a JSON document with a `records` array

use super::Normalizer;
use crate::error::{IngestError, Result};
use serde_json::Value;

#[derive(Debug, Default)]
pub struct AzureActivityNormalizer {
    records: Vec<Value>,
}

impl AzureActivityNormalizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Normalizer for AzureActivityNormalizer {
    fn name(&self) -> &'static str {
        "azure_test"
    }

    fn push(&mut self, content: &[u8]) -> Result<bool> {
        let mut document: Value = serde_json::from_slice(content)?;
        match document.get_mut("records").map(Value::take) {
            Some(Value::Array(records)) => self.records.extend(records),
            _ => return Err(IngestError::parse("Azure activity log has no records array")),
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
    use serde_json::json;

    #[test]
    fn test_records_pass_through() {
        let body = json!({"records": [{"operationName": "MICROSOFT.RESOURCES/DEPLOYMENTS/WRITE"}]});
        let mut normalizer = AzureActivityNormalizer::new();
        normalizer.push(body.to_string().as_bytes()).unwrap();
        assert_eq!(normalizer.records()[0]["operationName"], "MICROSOFT.RESOURCES/DEPLOYMENTS/WRITE");
    }

    #[test]
    fn test_missing_records() {
        let mut normalizer = AzureActivityNormalizer::new();
        assert!(matches!(
            normalizer.push(b"{}").unwrap_err(),
            IngestError::Parse(_)
        ));
    }
}
