//! Eventide Serve - HTTP API server for event producers and readers.
//!
//! By default this process also runs the single ingestion worker that drains
//! the queue into the store. Pass `--no-worker` when a standalone
//! `eventide-worker` is deployed against the same queue instead.

use axum::http::Request;
use clap::Parser;
use eventide_core::metrics::{init_metrics, start_metrics_server};
use eventide_ingest::IngestWorker;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use eventide_serve::{AppState, Config, router};

/// Eventide API server.
#[derive(Parser, Debug)]
#[command(name = "eventide-serve")]
#[command(about = "HTTP API for submitting and querying events", long_about = None)]
#[command(version)]
struct Args {
    /// Path to .env file (optional).
    #[arg(long, env = "DOTENV_PATH", default_value = ".env")]
    dotenv: String,

    /// Do not run the embedded ingestion worker.
    #[arg(long)]
    no_worker: bool,

    /// Prometheus metrics port (0 to disable).
    #[arg(long, env = "EVENTIDE_METRICS_PORT", default_value_t = 0)]
    metrics_port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load .env file if it exists
    if std::path::Path::new(&args.dotenv).exists() {
        dotenvy::from_path(&args.dotenv)?;
        eprintln!("Loaded environment from {}", args.dotenv);
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if args.metrics_port > 0 {
        match init_metrics() {
            Some(handle) => start_metrics_server(args.metrics_port, handle).await?,
            None => tracing::warn!("metrics recorder already installed, skipping exporter"),
        }
    }

    // Load configuration
    let config = Config::from_env()?;
    let bind_addr = config.bind_addr.clone();
    let worker_config = config.worker.clone();

    // Create application state
    let state = AppState::new(config)?;

    // Degraded start: report unreachable backends but keep serving.
    if let Err(e) = state.queue.ping().await {
        tracing::warn!(error = %e, "queue unreachable at startup");
    }
    if let Err(e) = state.store.ping().await {
        tracing::warn!(error = %e, "store unreachable at startup");
    }

    let shutdown = CancellationToken::new();

    let worker = if args.no_worker {
        tracing::info!("embedded ingestion worker disabled");
        None
    } else {
        let worker = IngestWorker::new(state.queue.clone(), state.store.clone(), worker_config);
        let token = shutdown.clone();
        Some(tokio::spawn(async move { worker.run(token).await }))
    };

    // Build router with middleware
    let app = router(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                tracing::span!(
                    Level::INFO,
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    query = request.uri().query().unwrap_or("")
                )
            }),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "starting server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // The server may also stop on its own; make sure the worker follows.
    shutdown.cancel();
    if let Some(worker) = worker {
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "ingestion worker task failed");
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM, cancelling `shutdown`.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "failed to listen for SIGTERM");
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

    tracing::info!("shutdown signal received, stopping gracefully...");
    shutdown.cancel();
}
