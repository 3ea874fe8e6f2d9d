//! Liveness and readiness endpoints.

use std::future::Future;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: String,
}

/// Liveness: the process is up and serving.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    /// `ready` or `degraded`
    pub status: &'static str,
    pub checks: DependencyChecks,
}

#[derive(Serialize)]
pub struct DependencyChecks {
    pub record_store: DependencyStatus,
    pub storage: DependencyStatus,
}

/// Outcome of one dependency check.
#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DependencyStatus {
    Ok { latency_ms: u64 },
    Error { error: String },
    /// Not configured, e.g. storage with mirroring off
    Disabled,
}

impl DependencyStatus {
    async fn of<E: ToString>(check: impl Future<Output = Result<(), E>>) -> Self {
        let start = Instant::now();
        match check.await {
            Ok(()) => Self::Ok {
                latency_ms: start.elapsed().as_millis() as u64,
            },
            Err(e) => Self::Error {
                error: e.to_string(),
            },
        }
    }

    fn is_failing(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Readiness: the record store answers and, when mirroring is on, object
/// storage is reachable. Degraded readiness is a 503.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let record_store = DependencyStatus::of(state.store.check_health()).await;
    let storage = match state.uploader {
        Some(ref uploader) => DependencyStatus::of(uploader.check_connectivity()).await,
        None => DependencyStatus::Disabled,
    };

    let degraded = record_store.is_failing() || storage.is_failing();
    let (code, status) = if degraded {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    } else {
        (StatusCode::OK, "ready")
    };

    (
        code,
        Json(ReadinessResponse {
            status,
            checks: DependencyChecks {
                record_store,
                storage,
            },
        }),
    )
}
