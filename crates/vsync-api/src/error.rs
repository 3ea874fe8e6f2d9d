//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use vsync_firestore::{FirestoreError, StoreError};
use vsync_mux::{EventError, MuxError, SignatureError};
use vsync_storage::StorageError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Mux error: {0}")]
    Mux(#[from] MuxError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Firestore error: {0}")]
    Firestore(#[from] FirestoreError),

    #[error("Record store error: {0}")]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = match &self {
            ApiError::NotFound(_) => self.to_string(),
            _ => {
                if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                    "An internal error occurred".to_string()
                } else {
                    self.to_string()
                }
            }
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

pub type WebhookResult<T> = Result<T, WebhookError>;

/// Why a webhook delivery was not acknowledged.
///
/// Responses carry a short plain-text reason. Client errors (4xx) tell the
/// provider not to bother redelivering; server errors (5xx) ask it to retry.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("No signature found")]
    Unauthenticated,

    #[error("Invalid signature: {0}")]
    InvalidSignature(SignatureError),

    #[error("{reason}")]
    Malformed { reason: String },

    #[error("Unknown event type: {0}")]
    Unrecognized(String),

    #[error("Failed to upload files: {0}")]
    MirrorFailure(String),

    #[error("Record store error: {0}")]
    Store(#[from] StoreError),
}

impl WebhookError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::Unauthenticated | WebhookError::InvalidSignature(_) => {
                StatusCode::UNAUTHORIZED
            }
            WebhookError::Malformed { .. } | WebhookError::Unrecognized(_) => StatusCode::BAD_REQUEST,
            WebhookError::MirrorFailure(_) | WebhookError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Response body sent back to the provider.
    pub fn reason(&self) -> &str {
        match self {
            WebhookError::Unauthenticated => "No signature found",
            WebhookError::InvalidSignature(_) => "Invalid signature",
            WebhookError::Malformed { reason } => reason,
            WebhookError::Unrecognized(_) => "Unknown event type",
            WebhookError::MirrorFailure(_) => "Failed to upload files",
            WebhookError::Store(_) => "Failed to update video",
        }
    }

    /// Metric label.
    pub fn outcome(&self) -> &'static str {
        match self {
            WebhookError::Unauthenticated => "unauthenticated",
            WebhookError::InvalidSignature(_) => "invalid_signature",
            WebhookError::Malformed { .. } => "malformed",
            WebhookError::Unrecognized(_) => "unrecognized",
            WebhookError::MirrorFailure(_) => "mirror_failure",
            WebhookError::Store(_) => "store_error",
        }
    }
}

impl From<SignatureError> for WebhookError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::Missing => WebhookError::Unauthenticated,
            other => WebhookError::InvalidSignature(other),
        }
    }
}

impl From<EventError> for WebhookError {
    fn from(err: EventError) -> Self {
        match err {
            EventError::Unrecognized(event_type) => WebhookError::Unrecognized(event_type),
            EventError::Malformed { reason, .. } => WebhookError::Malformed { reason },
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        (self.status_code(), self.reason().to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_errors_are_unauthorized() {
        let missing = WebhookError::from(SignatureError::Missing);
        assert!(matches!(missing, WebhookError::Unauthenticated));
        assert_eq!(missing.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(missing.reason(), "No signature found");

        let bad = WebhookError::from(SignatureError::Mismatch);
        assert_eq!(bad.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(bad.outcome(), "invalid_signature");
    }

    #[test]
    fn test_event_errors_are_bad_requests() {
        let err = WebhookError::from(EventError::malformed(Some("video.asset.ready"), "Missing playback id"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.reason(), "Missing playback id");

        let err = WebhookError::from(EventError::Unrecognized("video.upload.created".into()));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.reason(), "Unknown event type");
    }

    #[test]
    fn test_downstream_failures_are_server_errors() {
        let err = WebhookError::MirrorFailure("thumbnail: HTTP 404".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.reason(), "Failed to upload files");

        let err = WebhookError::from(StoreError::Unavailable("down".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.reason().contains("down"));
    }
}
