//! Space-delimited tokenizer for the AWS access-log formats
//!
//! Fields are separated by single spaces. A field wrapped in `"..."` or
//! `[...]` may itself contain spaces; its pieces are joined back with single
//! spaces and the wrapping characters are dropped.

use crate::error::{IngestError, Result};

fn opens(token: &str) -> bool {
    token.starts_with('"') || token.starts_with('[')
}

fn closes(token: &str) -> bool {
    token.ends_with('"') || token.ends_with(']')
}

/// Drop the first and last byte; callers only pass ASCII delimiters there.
fn unwrap_delimited(token: &str) -> String {
    token[1..token.len() - 1].to_string()
}

pub fn split_fields(line: &str) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut tokens = line.split(' ');

    while let Some(token) = tokens.next() {
        if !opens(token) {
            fields.push(token.to_string());
            continue;
        }

        if token.len() >= 2 && closes(token) {
            fields.push(unwrap_delimited(token));
            continue;
        }

        let mut run = token.to_string();
        loop {
            let next = tokens.next().ok_or_else(|| {
                IngestError::parse(format!("Unterminated quoted field in line: {}", line))
            })?;
            run.push(' ');
            run.push_str(next);
            if closes(next) {
                break;
            }
        }
        fields.push(unwrap_delimited(&run));
    }

    Ok(fields)
}
