//! Error types for recmailer
//!
//! This module provides the error handling for the crate:
//! - [`Error`] for setup-time and run-level failures (fatal to a run or the process)
//! - [`ProcessError`] for record-scoped failures, which only ever become a
//!   `Failure` outcome and never abort the pipeline
//! - HTTP status code mapping and the JSON error body used by the trigger API

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for recmailer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for recmailer
///
/// Everything in here is either a setup error (bad config, unreadable input,
/// unparsable template) or a failure of the run as a whole. Per-record
/// problems are [`ProcessError`]s and are tallied, not raised.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "RecUrl")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The batch input could not be read
    #[error("input error: {0}")]
    Csv(#[from] csv::Error),

    /// The presentation template could not be loaded or parsed
    #[error("template error: {0}")]
    Template(String),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// SMTP session could not be established
    #[error("SMTP error: {0}")]
    Smtp(String),

    /// Requester could not be authenticated or resolved
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Another batch run is already in progress
    #[error("a batch run is already in progress")]
    Busy,

    /// The run was cancelled before every outcome was collected
    #[error("batch run cancelled")]
    Cancelled,

    /// Every executor failed to establish its session
    #[error("no healthy executors: all {workers} workers failed to start")]
    NoHealthyExecutors {
        /// Configured pool size
        workers: usize,
    },

    /// The record queue closed before the source finished
    #[error("record queue closed before all records were queued")]
    QueueClosed,

    /// The outcome queue closed before the expected number of outcomes arrived
    #[error("batch incomplete: received {received} outcomes, expected {}", expected_display(.expected))]
    Incomplete {
        /// Outcomes tallied before the queue closed
        received: usize,
        /// Expected total, if the completion signal had arrived
        expected: Option<usize>,
    },

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

fn expected_display(expected: &Option<usize>) -> String {
    match expected {
        Some(n) => n.to_string(),
        None => "unknown".to_string(),
    }
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Record-scoped processing errors
///
/// Each variant corresponds to one step of fetch-render-send. They are logged
/// with the subject id and mapped to a `Failure` outcome by the processor.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Payload request failed (network error, timeout, non-OK status)
    #[error("failed to fetch {url}: {reason}")]
    Fetch {
        /// The fully substituted request URL
        url: String,
        /// What went wrong
        reason: String,
    },

    /// Payload body was not the expected JSON shape
    #[error("malformed payload: {0}")]
    Parse(String),

    /// Payload contained no suggestions
    #[error("no suggestions returned")]
    EmptyResult,

    /// Template rendering failed for this record
    #[error("render failed: {0}")]
    Render(String),

    /// SMTP submission failed for this record
    #[error("send failed: {0}")]
    Transport(String),
}

impl ProcessError {
    /// Name of the failing step, used as a structured log field
    pub fn step(&self) -> &'static str {
        match self {
            ProcessError::Fetch { .. } => "fetch",
            ProcessError::Parse(_) => "parse",
            ProcessError::EmptyResult => "suggestions",
            ProcessError::Render(_) => "render",
            ProcessError::Transport(_) => "send",
        }
    }
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "busy",
///     "message": "a batch run is already in progress"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "unauthorized", "busy")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Unauthorized(_) => 401,
            Error::Busy => 409,

            // Server-side configuration and input problems
            Error::Config { .. } => 500,
            Error::Io(_) => 500,
            Error::Csv(_) => 500,
            Error::Template(_) => 500,
            Error::QueueClosed => 500,
            Error::Incomplete { .. } => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,

            // External service errors
            Error::Network(_) => 502,
            Error::Smtp(_) => 502,
            Error::NoHealthyExecutors { .. } => 502,

            Error::Cancelled => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Csv(_) => "input_error",
            Error::Template(_) => "template_error",
            Error::Network(_) => "network_error",
            Error::Smtp(_) => "smtp_error",
            Error::Unauthorized(_) => "unauthorized",
            Error::Busy => "busy",
            Error::Cancelled => "cancelled",
            Error::NoHealthyExecutors { .. } => "no_healthy_executors",
            Error::QueueClosed => "queue_closed",
            Error::Incomplete { .. } => "incomplete",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            Error::Incomplete { received, expected } => Some(serde_json::json!({
                "received": received,
                "expected": expected,
            })),
            Error::NoHealthyExecutors { workers } => Some(serde_json::json!({
                "workers": workers,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn all_error_variants() -> Vec<(Error, u16, &'static str)> {
        vec![
            (
                Error::config("RecUrl", "missing %s placeholder"),
                500,
                "config_error",
            ),
            (
                Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")),
                500,
                "io_error",
            ),
            (
                Error::Template("unclosed block".into()),
                500,
                "template_error",
            ),
            (Error::Smtp("connection refused".into()), 502, "smtp_error"),
            (
                Error::Unauthorized("missing session cookie".into()),
                401,
                "unauthorized",
            ),
            (Error::Busy, 409, "busy"),
            (Error::Cancelled, 503, "cancelled"),
            (
                Error::NoHealthyExecutors { workers: 4 },
                502,
                "no_healthy_executors",
            ),
            (Error::QueueClosed, 500, "queue_closed"),
            (
                Error::Incomplete {
                    received: 3,
                    expected: Some(5),
                },
                500,
                "incomplete",
            ),
            (
                Error::ApiServerError("bind failed".into()),
                500,
                "api_server_error",
            ),
            (Error::Other("unknown".into()), 500, "internal_error"),
        ]
    }

    #[test]
    fn test_status_and_error_codes() {
        for (error, status, code) in all_error_variants() {
            assert_eq!(error.status_code(), status, "status for {error}");
            assert_eq!(error.error_code(), code, "code for {error}");
        }
    }

    #[test]
    fn test_api_error_from_config_error_includes_key() {
        let api_error: ApiError = Error::config("SmtpServer", "empty").into();
        assert_eq!(api_error.error.code, "config_error");
        assert_eq!(api_error.error.details.unwrap()["key"], "SmtpServer");
    }

    #[test]
    fn test_incomplete_message_without_expected_total() {
        let error = Error::Incomplete {
            received: 2,
            expected: None,
        };
        assert_eq!(
            error.to_string(),
            "batch incomplete: received 2 outcomes, expected unknown"
        );
    }

    #[test]
    fn test_process_error_steps() {
        let fetch = ProcessError::Fetch {
            url: "http://recs/42".into(),
            reason: "HTTP 500".into(),
        };
        assert_eq!(fetch.step(), "fetch");
        assert_eq!(ProcessError::Parse("eof".into()).step(), "parse");
        assert_eq!(ProcessError::EmptyResult.step(), "suggestions");
        assert_eq!(ProcessError::Render("bad".into()).step(), "render");
        assert_eq!(ProcessError::Transport("reset".into()).step(), "send");
    }

    #[test]
    fn test_api_error_serialization_skips_empty_details() {
        let json = serde_json::to_value(ApiError::unauthorized("nope")).unwrap();
        assert_eq!(json["error"]["code"], "unauthorized");
        assert!(json["error"].get("details").is_none());
    }
}
