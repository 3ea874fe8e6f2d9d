//! Mux client error types.

use thiserror::Error;

/// Result type for Mux client operations.
pub type MuxResult<T> = Result<T, MuxError>;

/// Errors raised while setting up the Mux client.
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Event(#[from] EventError),
}

impl MuxError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

/// Reasons a webhook signature is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("No signature found")]
    Missing,

    #[error("Malformed signature header: {0}")]
    Malformed(String),

    #[error("Signature timestamp {timestamp} outside tolerance (now {now})")]
    Expired { timestamp: i64, now: i64 },

    #[error("Signature mismatch")]
    Mismatch,
}

impl SignatureError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            SignatureError::Missing => "missing",
            SignatureError::Malformed(_) => "malformed",
            SignatureError::Expired { .. } => "expired",
            SignatureError::Mismatch => "mismatch",
        }
    }
}

/// Reasons a webhook payload cannot be turned into an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// The `type` field names an event this service does not handle.
    #[error("Unknown event type: {0}")]
    Unrecognized(String),

    /// A recognized event is missing a field it cannot be applied without.
    #[error("{reason}")]
    Malformed {
        event_type: Option<String>,
        reason: String,
    },
}

impl EventError {
    pub fn malformed(event_type: Option<&str>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            event_type: event_type.map(str::to_string),
            reason: reason.into(),
        }
    }
}
