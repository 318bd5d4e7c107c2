//! Health check endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

/// Readiness report with queue and store checked independently.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    queue: &'static str,
    store: &'static str,
    version: &'static str,
}

/// `GET /health`
///
/// 200 when both the queue and the store answer, 503 otherwise. Use this
/// for readiness probes.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (queue, store) = tokio::join!(state.queue.ping(), state.store.ping());

    if let Err(e) = &queue {
        tracing::warn!(error = %e, "health: queue unreachable");
    }
    if let Err(e) = &store {
        tracing::warn!(error = %e, "health: store unreachable");
    }

    let healthy = queue.is_ok() && store.is_ok();
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "degraded" },
            queue: if queue.is_ok() { "connected" } else { "unreachable" },
            store: if store.is_ok() { "connected" } else { "unreachable" },
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct LiveResponse {
    status: &'static str,
    version: &'static str,
}

/// `GET /health/live`
///
/// Process liveness only; never touches a backend.
pub async fn liveness() -> Json<LiveResponse> {
    Json(LiveResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
