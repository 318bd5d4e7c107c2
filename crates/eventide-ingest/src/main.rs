//! Eventide standalone ingestion worker.
//!
//! Drains the event queue into the event store. Run exactly one worker per
//! queue: either this binary or the worker embedded in `eventide-serve`
//! (started with `--no-worker` when this binary is deployed).
//!
//! # Usage
//!
//! ```bash
//! # Defaults: local Redis, ./data/events.sqlite
//! eventide-worker
//!
//! # Custom backends and retry policy
//! eventide-worker \
//!     --redis-url redis://redis:6379/0 \
//!     --db-path /var/lib/eventide/events.sqlite \
//!     --max-attempts 10 \
//!     --metrics-port 9091
//! ```
//!
//! # Graceful Shutdown
//!
//! SIGINT (Ctrl+C) and SIGTERM stop the loop after the item in hand has been
//! stored, requeued or dead-lettered.

use anyhow::{Context, Result};
use clap::Parser;
use eventide_core::metrics::{init_metrics, start_metrics_server};
use eventide_ingest::{
    EventQueue, EventStore, IngestWorker, RedisQueue, RedisQueueConfig, SqliteStore, WorkerConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Eventide ingestion worker.
#[derive(Parser, Debug)]
#[command(name = "eventide-worker")]
#[command(about = "Drains the event queue into the event store")]
#[command(version)]
struct Args {
    /// Redis URL
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// Redis list holding pending events
    #[arg(long, env = "EVENTIDE_QUEUE_KEY", default_value = "events_queue")]
    queue_key: String,

    /// Redis list holding dead-lettered events
    #[arg(long, env = "EVENTIDE_DEAD_LETTER_KEY", default_value = "events_queue:dead")]
    dead_letter_key: String,

    /// SQLite database path
    #[arg(long, env = "EVENTIDE_DB_PATH", default_value = "./data/events.sqlite")]
    db_path: PathBuf,

    /// Seconds one blocking pop waits before looping
    #[arg(long, env = "EVENTIDE_POP_TIMEOUT_SECS", default_value_t = 5)]
    pop_timeout_secs: u64,

    /// Store attempts before an event is dead-lettered
    #[arg(long, env = "EVENTIDE_MAX_ATTEMPTS", default_value_t = 5)]
    max_attempts: u32,

    /// Backoff after the first failure, in milliseconds
    #[arg(long, env = "EVENTIDE_BACKOFF_BASE_MS", default_value_t = 500)]
    backoff_base_ms: u64,

    /// Upper bound on the backoff, in milliseconds
    #[arg(long, env = "EVENTIDE_BACKOFF_MAX_MS", default_value_t = 30_000)]
    backoff_max_ms: u64,

    /// Prometheus metrics port (0 to disable)
    #[arg(long, default_value_t = 0)]
    metrics_port: u16,
}

impl Args {
    fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            pop_timeout: Duration::from_secs(self.pop_timeout_secs.max(1)),
            max_attempts: self.max_attempts.max(1),
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    tracing::info!("Eventide ingestion worker starting...");

    if args.metrics_port > 0 {
        match init_metrics() {
            Some(handle) => start_metrics_server(args.metrics_port, handle)
                .await
                .context("Failed to start metrics server")?,
            None => tracing::warn!("Metrics recorder already installed, skipping exporter"),
        }
    }

    let queue = RedisQueue::new(RedisQueueConfig {
        url: args.redis_url.clone(),
        queue_key: args.queue_key.clone(),
        dead_letter_key: args.dead_letter_key.clone(),
    })
    .context("Invalid Redis URL")?;
    let queue: Arc<dyn EventQueue> = Arc::new(queue);
    let store: Arc<dyn EventStore> = Arc::new(SqliteStore::new(&args.db_path));

    tracing::info!("Configuration:");
    tracing::info!("  Queue: {} (dead letters: {})", args.queue_key, args.dead_letter_key);
    tracing::info!("  Store: {}", args.db_path.display());
    tracing::info!("  Max attempts: {}", args.max_attempts);

    // Degraded start: report, then let the loop retry.
    if let Err(e) = queue.ping().await {
        tracing::warn!(error = %e, "Queue unreachable at startup");
    }
    if let Err(e) = store.ping().await {
        tracing::warn!(error = %e, "Store unreachable at startup");
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let worker = IngestWorker::new(queue, store, args.worker_config());
    worker.run(shutdown).await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received, stopping gracefully...");
    shutdown.cancel();
}
