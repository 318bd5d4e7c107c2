//! Prometheus metrics helpers for Eventide.
//!
//! # Usage
//!
//! ```rust,ignore
//! use eventide_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let handle = init_metrics();
//!     start_metrics_server(9091, handle).await.unwrap();
//!
//!     metrics::counter!("gateway_events_queued_total").increment(1);
//! }
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: component name (`gateway_`, `worker_`, `queue_`)
//! - Suffix: unit or type (`_total`, `_seconds`)
//! - Labels: used sparingly (`outcome` on upserts only)

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Events accepted by the gateway and pushed onto the queue.
pub const GATEWAY_EVENTS_QUEUED: &str = "gateway_events_queued_total";
/// Submissions rejected by gateway validation.
pub const GATEWAY_EVENTS_REJECTED: &str = "gateway_events_rejected_total";
/// Successful upserts, labelled `outcome=inserted|updated`.
pub const WORKER_EVENTS_UPSERTED: &str = "worker_events_upserted_total";
/// Malformed queue items dropped by the worker.
pub const WORKER_EVENTS_DROPPED: &str = "worker_events_dropped_total";
/// Items re-pushed to the queue tail after a store failure.
pub const WORKER_EVENTS_REQUEUED: &str = "worker_events_requeued_total";
/// Items moved to the dead-letter list after exhausting their attempts.
pub const WORKER_EVENTS_DEAD_LETTERED: &str = "worker_events_dead_lettered_total";
/// Time spent applying one upsert.
pub const WORKER_UPSERT_DURATION: &str = "worker_upsert_duration_seconds";
/// Whether the ingestion worker loop is running (1=yes, 0=no).
pub const WORKER_RUNNING: &str = "worker_running";

/// Initialize the Prometheus metrics recorder.
///
/// This must be called once at startup before any metrics are recorded.
/// Returns `None` if a recorder is already installed (e.g. in tests).
pub fn init_metrics() -> Option<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder().ok()?;
    register_metrics();
    Some(handle)
}

/// Start the Prometheus metrics HTTP server.
///
/// Serves `/metrics` on the given port from a background task and returns
/// once the listener is bound.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "metrics server stopped");
        }
    });

    Ok(())
}

/// Register descriptions for every metric the pipeline records.
fn register_metrics() {
    // =========================================================================
    // Producer Gateway
    // =========================================================================

    describe_counter!(
        GATEWAY_EVENTS_QUEUED,
        "Events accepted for processing and pushed onto the queue"
    );
    describe_counter!(
        GATEWAY_EVENTS_REJECTED,
        "Events rejected by submission validation"
    );

    // =========================================================================
    // Ingestion Worker
    // =========================================================================

    describe_counter!(
        WORKER_EVENTS_UPSERTED,
        "Events written to the store (label: outcome)"
    );
    describe_counter!(
        WORKER_EVENTS_DROPPED,
        "Malformed queue items dropped without retry"
    );
    describe_counter!(
        WORKER_EVENTS_REQUEUED,
        "Queue items pushed back after a store failure"
    );
    describe_counter!(
        WORKER_EVENTS_DEAD_LETTERED,
        "Queue items moved to the dead-letter list"
    );
    describe_histogram!(WORKER_UPSERT_DURATION, "Time spent on a single upsert");
    describe_gauge!(
        WORKER_RUNNING,
        "Whether the ingestion worker is running (1=yes, 0=no)"
    );
}
