//! Record store metrics.

use std::time::Duration;

use metrics::{counter, histogram};

pub mod names {
    /// Firestore calls by operation and HTTP status.
    pub const REQUESTS_TOTAL: &str = "vsync_firestore_requests_total";
    pub const REQUEST_DURATION_SECONDS: &str = "vsync_firestore_request_duration_seconds";
    /// Retries of transient failures by operation.
    pub const RETRIES_TOTAL: &str = "vsync_firestore_retries_total";
    /// Documents matched by correlation-key lookups.
    pub const KEY_MATCHES_TOTAL: &str = "vsync_firestore_key_matches_total";
}

/// Record a completed Firestore call. `status` is 200 on success.
pub fn record_request(operation: &str, status: u16, elapsed: Duration) {
    let labels = [
        ("operation", operation.to_string()),
        ("status", status.to_string()),
    ];
    counter!(names::REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::REQUEST_DURATION_SECONDS, "operation" => operation.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_retry(operation: &str) {
    counter!(names::RETRIES_TOTAL, "operation" => operation.to_string()).increment(1);
}

pub fn record_key_matches(collection: &str, matches: usize) {
    counter!(names::KEY_MATCHES_TOTAL, "collection" => collection.to_string())
        .increment(matches as u64);
}
