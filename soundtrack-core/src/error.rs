//! Error types for soundtrack-core
//!
//! Two families live here. [`Error`] is the ordinary library error returned by
//! construction and model validation. [`CallError`] and [`DropReason`] describe
//! per-notification failures; they are reported through
//! [`Outcome`](crate::pipeline::Outcome) and never surface as an `Err` from
//! [`Pipeline::handle`](crate::pipeline::Pipeline::handle).

use serde::Serialize;
use thiserror::Error;

/// Main error type for the soundtrack-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A media item violates a model invariant
    #[error("invalid media item {id}: {message}")]
    InvalidMedia { id: String, message: String },

    /// A mood event could not be constructed
    #[error("invalid mood event: {0}")]
    InvalidMood(String),
}

/// Result type alias for soundtrack-core
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single outbound stage call.
///
/// Every variant is terminal for the invocation that produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallError {
    /// The call did not complete within its configured bound
    #[error("timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// Connection-level failure (DNS, refused, reset, TLS)
    #[error("transport error: {0}")]
    Transport(String),

    /// The stage answered with a non-2xx status
    #[error("upstream rejected ({status}): {body}")]
    UpstreamRejected { status: u16, body: String },
}

impl CallError {
    /// HTTP status, when the stage got far enough to send one
    pub fn status(&self) -> Option<u16> {
        match self {
            CallError::UpstreamRejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short machine-friendly name for log fields
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::Timeout { .. } => "timeout",
            CallError::Transport(_) => "transport",
            CallError::UpstreamRejected { .. } => "upstream_rejected",
        }
    }
}

/// Why the event adapter refused to normalize a notification.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Required field missing or empty
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// Document lives outside the `media` collection
    #[error("unexpected collection: {0}")]
    UnexpectedCollection(String),

    /// Field present but unusable
    #[error("malformed field {field}: {message}")]
    MalformedField { field: &'static str, message: String },

    /// Payload matched neither notification shape
    #[error("unrecognized notification: {0}")]
    Unrecognized(String),
}
