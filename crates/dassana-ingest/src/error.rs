//! Error taxonomy for the ingestion client
//!
//! Four classified kinds drive how a failed job is reported to the control
//! plane (see [`ErrorKind`]); every other variant is unclassified and is
//! reported as a cancellation.

use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Credentials were rejected; `response` keeps the raw auth reply
    #[error("Authentication failed: {message}")]
    Authentication { message: String, response: String },

    /// The data source being collected from failed
    #[error("External source error: {message}")]
    External { message: String },

    /// This client or its control-plane dependency failed. `retryable` is
    /// set when the same call may succeed on another attempt.
    #[error("Internal error ({origin}): {message}")]
    Internal {
        origin: String,
        message: String,
        retryable: bool,
    },

    /// Writing or uploading to the storage stage failed
    #[error("Stage write failure: {message}")]
    StageWrite { message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid writer state: {0}")]
    InvalidState(String),

    #[error("Parse error: {0}")]
    Parse(String),

    /// A storage or STS call failed in a way another attempt may fix
    #[error("{service} unavailable: {message}")]
    Unavailable { service: String, message: String },

    /// Anything a collector raises that fits no other variant
    #[error("Unexpected error: {0}")]
    Unexpected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] dassana_common::CommonError),
}

impl IngestError {
    pub fn authentication(message: impl Into<String>, response: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
            response: response.into(),
        }
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::External {
            message: message.into(),
        }
    }

    pub fn internal(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Internal {
            origin: origin.into(),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn stage_write(message: impl Into<String>) -> Self {
        Self::StageWrite {
            message: message.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn unavailable(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn unexpected(err: impl std::fmt::Display) -> Self {
        Self::Unexpected(err.to_string())
    }

    /// Internal error for a response that could not be used.
    ///
    /// The raw body, the response headers and the underlying cause all end up
    /// in the message so the job's debug log is enough to diagnose it.
    pub fn from_response(
        origin: impl Into<String>,
        service: &str,
        body: &str,
        headers: &str,
        cause: &dyn std::fmt::Display,
    ) -> Self {
        Self::internal(
            origin,
            format!(
                "Error getting response from {} with response body: {} and response header: {} and cause: {}",
                service, body, headers, cause
            ),
        )
    }

    /// Same as [`IngestError::from_response`] for a body that did not decode.
    /// Gateways answer with HTML pages during restarts, so these are retried.
    pub fn undecodable_response(
        origin: impl Into<String>,
        service: &str,
        body: &str,
        headers: &str,
        cause: &dyn std::fmt::Display,
    ) -> Self {
        match Self::from_response(origin, service, body, headers, cause) {
            Self::Internal { origin, message, .. } => Self::Internal {
                origin,
                message,
                retryable: true,
            },
            other => other,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::External { .. } => ErrorKind::External,
            Self::Internal { .. } => ErrorKind::Internal,
            Self::StageWrite { .. } => ErrorKind::StageWrite,
            _ => ErrorKind::Unclassified,
        }
    }

    /// Transport-level failures and undecodable responses are worth another
    /// attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Io(_) | Self::Unavailable { .. } => true,
            Self::Internal { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Short reason reported as `failure_reason`.
    pub fn failure_reason(&self) -> String {
        match self {
            Self::Authentication { message, .. }
            | Self::External { message }
            | Self::Internal { message, .. }
            | Self::StageWrite { message } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Entry appended to the job's debug log when the job is cancelled.
    pub fn debug_entry(&self) -> String {
        match self {
            Self::Authentication { response, .. } => {
                format!("Auth Response: {} Stack Trace: {}", response, self)
            },
            other => other.to_string(),
        }
    }

    /// Re-tag any failure that happened while pushing data to the stage.
    pub fn into_stage_write(self) -> Self {
        match self {
            Self::StageWrite { .. } => self,
            other => Self::stage_write(other.to_string()),
        }
    }
}

/// Closed classification used when reporting a failed job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    External,
    Authentication,
    Internal,
    StageWrite,
    Unclassified,
}

impl ErrorKind {
    pub fn error_code(self) -> &'static str {
        match self {
            ErrorKind::Authentication => "auth_error",
            ErrorKind::StageWrite => "stage_write_failure",
            ErrorKind::External | ErrorKind::Internal | ErrorKind::Unclassified => "other_error",
        }
    }

    /// `status` carried in the failure payload
    pub fn status(self) -> &'static str {
        match self {
            ErrorKind::External | ErrorKind::Authentication | ErrorKind::StageWrite => "failed",
            ErrorKind::Internal | ErrorKind::Unclassified => "canceled",
        }
    }

    pub fn fail_type(self) -> crate::api::FailType {
        match self {
            ErrorKind::External | ErrorKind::Authentication | ErrorKind::StageWrite => {
                crate::api::FailType::Failed
            },
            ErrorKind::Internal | ErrorKind::Unclassified => crate::api::FailType::Cancel,
        }
    }

    pub fn is_internal(self) -> bool {
        matches!(self, ErrorKind::Internal | ErrorKind::Unclassified)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::api::FailType;

    #[test]
    fn test_classification_table() {
        let cases = [
            (IngestError::external("source down"), "failed", "other_error", FailType::Failed),
            (
                IngestError::authentication("bad key", "{\"error\":\"denied\"}"),
                "failed",
                "auth_error",
                FailType::Failed,
            ),
            (IngestError::internal("job", "no job"), "canceled", "other_error", FailType::Cancel),
            (
                IngestError::stage_write("bucket gone"),
                "failed",
                "stage_write_failure",
                FailType::Failed,
            ),
            (IngestError::config("missing"), "canceled", "other_error", FailType::Cancel),
        ];

        for (error, status, code, fail_type) in cases {
            let kind = error.kind();
            assert_eq!(kind.status(), status, "{error}");
            assert_eq!(kind.error_code(), code, "{error}");
            assert_eq!(kind.fail_type(), fail_type, "{error}");
        }
    }

    #[test]
    fn test_auth_debug_entry_carries_response() {
        let error = IngestError::authentication("invalid client", "{\"error\":\"invalid_client\"}");
        assert_eq!(
            error.debug_entry(),
            "Auth Response: {\"error\":\"invalid_client\"} Stack Trace: Authentication failed: invalid client"
        );
        assert_eq!(error.failure_reason(), "invalid client");
    }

    #[test]
    fn test_unclassified_failure_reason_is_display() {
        let error = IngestError::parse("bad int");
        assert_eq!(error.failure_reason(), "Parse error: bad int");
        assert_eq!(error.kind(), ErrorKind::Unclassified);

        let error = IngestError::unexpected("collector panicked");
        assert_eq!(error.kind().fail_type(), crate::api::FailType::Cancel);
        assert_eq!(error.failure_reason(), "Unexpected error: collector panicked");
    }

    #[test]
    fn test_from_response_preserves_body() {
        let error = IngestError::from_response(
            "Failed to get access token",
            "auth-service",
            "<html>oops</html>",
            "{\"content-type\": \"text/html\"}",
            &"expected value at line 1 column 1",
        );
        let message = error.to_string();
        assert!(message.contains("<html>oops</html>"));
        assert!(message.contains("text/html"));
        assert!(message.contains("expected value"));
        assert_eq!(error.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_only_undecodable_responses_are_retryable() {
        let rejected = IngestError::from_response("create", "ingestion-service", "busy", "{}", &"status 503");
        assert!(!rejected.is_retryable());

        let garbled = IngestError::undecodable_response(
            "create",
            "ingestion-service",
            "<html>gateway</html>",
            "{}",
            &"expected value",
        );
        assert!(garbled.is_retryable());
        assert_eq!(garbled.kind(), ErrorKind::Internal);
        assert!(garbled.to_string().contains("<html>gateway</html>"));

        assert!(!IngestError::internal("job", "no job").is_retryable());
    }

    #[test]
    fn test_unavailable_becomes_stage_write() {
        let error = IngestError::unavailable("S3", "dispatch failure");
        assert!(error.is_retryable());

        let error = error.into_stage_write();
        assert_eq!(error.kind(), ErrorKind::StageWrite);
        assert!(!error.is_retryable());
        assert_eq!(error.failure_reason(), "S3 unavailable: dispatch failure");
    }

    #[test]
    fn test_into_stage_write() {
        let error = IngestError::Io(std::io::Error::other("disk full")).into_stage_write();
        assert_eq!(error.kind(), ErrorKind::StageWrite);
        assert!(error.failure_reason().contains("disk full"));
    }
}
