//! VPC flow logs: gzipped space-delimited text whose first line names the
//! fields

use super::{cast_number, gunzip_text, Normalizer, EMPTY_FIELD};
use crate::error::{IngestError, Result};
use serde_json::{Map, Value};

const NUMERIC_FIELDS: &[&str] = &[
    "version",
    "srcport",
    "dstport",
    "protocol",
    "packets",
    "bytes",
    "start",
    "end",
    "tcp-flags",
    "traffic-path",
];

#[derive(Debug, Default)]
pub struct VpcFlowNormalizer {
    records: Vec<Value>,
}

impl VpcFlowNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_line(header: &[&str], line: &str) -> Result<Value> {
        let values: Vec<&str> = line.split(' ').collect();
        if values.len() != header.len() {
            return Err(IngestError::parse(format!(
                "VPC flow record has {} fields, header has {}",
                values.len(),
                header.len()
            )));
        }

        let mut record = Map::new();
        for (field, raw) in header.iter().zip(values) {
            let value = if raw != EMPTY_FIELD && NUMERIC_FIELDS.contains(field) {
                cast_number(field, raw)?
            } else {
                Value::String(raw.to_string())
            };
            record.insert((*field).to_string(), value);
        }
        Ok(Value::Object(record))
    }
}

impl Normalizer for VpcFlowNormalizer {
    fn name(&self) -> &'static str {
        "aws_vpc_flow"
    }

    fn push(&mut self, content: &[u8]) -> Result<bool> {
        let text = gunzip_text(content)?;
        let mut lines = text.lines().filter(|line| !line.is_empty());

        let Some(header) = lines.next() else {
            return Ok(false);
        };
        let header: Vec<&str> = header.split(' ').collect();

        for line in lines {
            self.records.push(Self::parse_line(&header, line)?);
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
