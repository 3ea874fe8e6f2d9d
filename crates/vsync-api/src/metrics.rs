//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "vsync_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vsync_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vsync_http_requests_in_flight";

    // Webhook metrics
    pub const WEBHOOK_EVENTS_TOTAL: &str = "vsync_webhook_events_total";
    pub const SIGNATURE_FAILURES_TOTAL: &str = "vsync_signature_failures_total";

    // Mirror metrics
    pub const MIRROR_DURATION_SECONDS: &str = "vsync_mirror_duration_seconds";
    pub const MIRROR_FAILURES_TOTAL: &str = "vsync_mirror_failures_total";
}

/// Label for requests that matched no route.
const UNMATCHED_PATH: &str = "unmatched";

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a handled webhook delivery.
pub fn record_webhook_event(event_type: &str, outcome: &str) {
    let labels = [
        ("type", event_type.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!(names::WEBHOOK_EVENTS_TOTAL, &labels).increment(1);
}

/// Record a rejected signature.
pub fn record_signature_failure(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::SIGNATURE_FAILURES_TOTAL, &labels).increment(1);
}

/// Record a derived-asset mirror run.
pub fn record_mirror(duration_secs: f64, success: bool) {
    histogram!(names::MIRROR_DURATION_SECONDS).record(duration_secs);
    if !success {
        counter!(names::MIRROR_FAILURES_TOTAL).increment(1);
    }
}

/// Metrics middleware for HTTP requests.
///
/// Requests are labelled by their route template, so IDs never end up in
/// label values.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_PATH.to_string());
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
