//! Provider webhook handler.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use tracing::warn;

use vsync_mux::{decode_slice, EventError, SignatureError, SIGNATURE_HEADER};

use crate::error::{WebhookError, WebhookResult};
use crate::metrics;
use crate::state::AppState;

/// Body sent when a delivery has been processed.
pub const ACKNOWLEDGED: &str = "Webhook received";

/// Event type label used before (or instead of) a successful decode.
const UNKNOWN_TYPE: &str = "unknown";

/// Receive a provider webhook.
///
/// The signature is checked against the exact request bytes before anything
/// is parsed. Rejected deliveries never reach the record store.
pub async fn mux_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult<(StatusCode, &'static str)> {
    let verified = match headers.get(SIGNATURE_HEADER).map(|v| v.to_str()) {
        Some(Err(_)) => Err(SignatureError::Malformed(
            "header is not valid ASCII".to_string(),
        )),
        signature => state.verifier.verify(&body, signature.and_then(Result::ok)),
    };

    if let Err(e) = verified {
        warn!(reason = e.reason(), body_len = body.len(), "Rejected webhook signature");
        metrics::record_signature_failure(e.reason());
        return Err(reject(UNKNOWN_TYPE, e.into()));
    }

    let event = match decode_slice(&body) {
        Ok(event) => event,
        Err(EventError::Unrecognized(event_type)) => {
            warn!(event_type = %event_type, "Ignoring unrecognized webhook event type");
            return Err(reject(UNKNOWN_TYPE, WebhookError::Unrecognized(event_type)));
        }
        Err(e @ EventError::Malformed { .. }) => {
            let event_type = malformed_event_label(&e).to_string();
            warn!(event_type = %event_type, "Malformed webhook event: {}", e);
            return Err(reject(&event_type, e.into()));
        }
    };

    let event_type = event.event_type();
    match state.reconciler.apply(&event).await {
        Ok(_) => {
            metrics::record_webhook_event(event_type, "ok");
            Ok((StatusCode::OK, ACKNOWLEDGED))
        }
        Err(e) => {
            warn!(event_type = event_type, "Webhook processing failed: {}", e);
            Err(reject(event_type, e))
        }
    }
}

fn reject(event_type: &str, err: WebhookError) -> WebhookError {
    metrics::record_webhook_event(event_type, err.outcome());
    err
}

/// Metrics label for an event that failed to decode. Only recognized types
/// are echoed, which keeps the label set bounded.
fn malformed_event_label(err: &EventError) -> &str {
    match err {
        EventError::Malformed {
            event_type: Some(event_type),
            ..
        } => event_type,
        _ => UNKNOWN_TYPE,
    }
}
