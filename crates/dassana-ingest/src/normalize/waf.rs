//! WAF logs: gzipped text, each line kept as a raw string record

use super::{gunzip_text, Normalizer};
use crate::error::Result;
use serde_json::Value;

#[derive(Debug, Default)]
pub struct WafNormalizer {
    records: Vec<Value>,
}

impl WafNormalizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Normalizer for WafNormalizer {
    fn name(&self) -> &'static str {
        "aws_waf"
    }

    fn push(&mut self, content: &[u8]) -> Result<bool> {
        let text = gunzip_text(content)?;
        self.records.extend(
            text.lines()
                .filter(|line| !line.is_empty())
                .map(|line| Value::String(line.to_string())),
        );
        Ok(false)
    }

    fn records(&self) -> &[Value] {
        &self.records
    }

    fn records_mut(&mut self) -> &mut Vec<Value> {
        &mut self.records
    }
}
