//! Application state and configuration.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use eventide_ingest::{
    AdminService, EventQueue, EventStore, Gateway, QueryService, RedisQueue, RedisQueueConfig,
    SqliteStore, WorkerConfig,
};

/// Application configuration loaded from environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:8000").
    pub bind_addr: String,

    /// Redis queue location and list names.
    pub queue: RedisQueueConfig,

    /// SQLite database path.
    pub db_path: PathBuf,

    /// Tokens accepted on admin routes. Empty means admin routes are open.
    pub admin_tokens: HashSet<String>,

    /// Settings for the embedded ingestion worker.
    pub worker: WorkerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            queue: RedisQueueConfig {
                url: "redis://127.0.0.1:6379".to_string(),
                ..Default::default()
            },
            db_path: PathBuf::from("./data/events.sqlite"),
            admin_tokens: HashSet::new(),
            worker: WorkerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// All variables are optional:
    /// - `EVENTIDE_BIND_ADDR`: Server bind address (default: "0.0.0.0:8000")
    /// - `PORT`: Overrides the port of the bind address
    /// - `REDIS_URL`: Redis URL (default: "redis://127.0.0.1:6379")
    /// - `EVENTIDE_QUEUE_KEY`: Queue list (default: "events_queue")
    /// - `EVENTIDE_DEAD_LETTER_KEY`: Dead-letter list (default: "events_queue:dead")
    /// - `EVENTIDE_DB_PATH`: SQLite path (default: "./data/events.sqlite")
    /// - `EVENTIDE_ADMIN_TOKENS`: Comma-separated admin tokens
    /// - `EVENTIDE_POP_TIMEOUT_SECS`, `EVENTIDE_MAX_ATTEMPTS`,
    ///   `EVENTIDE_BACKOFF_BASE_MS`, `EVENTIDE_BACKOFF_MAX_MS`: worker tuning
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self::from_vars(|key| std::env::var(key).ok())?;

        tracing::info!(
            bind_addr = %config.bind_addr,
            queue_key = %config.queue.queue_key,
            db_path = %config.db_path.display(),
            admin_token_count = config.admin_tokens.len(),
            "configuration loaded"
        );

        Ok(config)
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = var("EVENTIDE_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(port) = var("PORT") {
            let port: u16 = port.trim().parse().context("PORT must be a port number")?;
            let host = config
                .bind_addr
                .rsplit_once(':')
                .map_or(config.bind_addr.as_str(), |(host, _)| host);
            config.bind_addr = format!("{host}:{port}");
        }

        if let Some(url) = var("REDIS_URL") {
            config.queue.url = url;
        }
        if let Some(key) = var("EVENTIDE_QUEUE_KEY") {
            config.queue.queue_key = key;
        }
        if let Some(key) = var("EVENTIDE_DEAD_LETTER_KEY") {
            config.queue.dead_letter_key = key;
        }
        if let Some(path) = var("EVENTIDE_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        if let Some(tokens) = var("EVENTIDE_ADMIN_TOKENS") {
            config.admin_tokens = tokens
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Some(secs) = parse_var::<u64>(&var, "EVENTIDE_POP_TIMEOUT_SECS")? {
            config.worker.pop_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(max) = parse_var::<u32>(&var, "EVENTIDE_MAX_ATTEMPTS")? {
            config.worker.max_attempts = max.max(1);
        }
        if let Some(ms) = parse_var::<u64>(&var, "EVENTIDE_BACKOFF_BASE_MS")? {
            config.worker.backoff_base = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&var, "EVENTIDE_BACKOFF_MAX_MS")? {
            config.worker.backoff_max = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .with_context(|| format!("{key} must be a non-negative integer"))
        })
        .transpose()
}

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,

    pub queue: Arc<dyn EventQueue>,
    pub store: Arc<dyn EventStore>,

    pub gateway: Gateway,
    pub query: QueryService,
    pub admin: AdminService,
}

impl AppState {
    /// Create the production state: Redis queue and SQLite store.
    ///
    /// Neither backend is contacted here, so the server starts even when
    /// both are down and reports them through `/health`.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let queue = RedisQueue::new(config.queue.clone()).context("Invalid Redis URL")?;
        let store = SqliteStore::new(&config.db_path);
        Ok(Self::with_backends(config, Arc::new(queue), Arc::new(store)))
    }

    /// Create state around already-built backends.
    pub fn with_backends(
        config: Config,
        queue: Arc<dyn EventQueue>,
        store: Arc<dyn EventStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            gateway: Gateway::new(Arc::clone(&queue)),
            query: QueryService::new(Arc::clone(&store)),
            admin: AdminService::new(Arc::clone(&queue), Arc::clone(&store)),
            queue,
            store,
        }
    }
}
