//! Eventide ingestion pipeline components.
//!
//! This crate holds everything between the HTTP surface and the disk:
//!
//! - [`queue`] - durable FIFO of serialized submissions (Redis, in-memory)
//! - [`store`] - deduplicated event store keyed on `source_id` (SQLite)
//! - [`worker`] - the single consumer that drains the queue into the store
//! - [`gateway`] - validates submissions and pushes them onto the queue
//! - [`query`] - filtered, paginated reads over the store
//! - [`admin`] - soft delete, aggregate stats and dead-letter replay
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ Producer Gateway│  validate, push (never touches the store)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   EventQueue    │  Redis list, blocking pop, dead-letter list
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  IngestWorker   │  single consumer, bounded retries with backoff
//! └────────┬────────┘
//!          │ upsert by source_id
//!          ▼
//! ┌─────────────────┐
//! │   EventStore    │◄── QueryService / AdminService
//! └─────────────────┘
//! ```
//!
//! The worker is the only writer for producer-originated data; the admin
//! soft delete is the only other mutation path.

pub mod admin;
pub mod error;
pub mod gateway;
pub mod query;
pub mod queue;
pub mod store;
pub mod worker;

// Re-export commonly used types at crate root
pub use error::{Error, RejectedEvent, Result};

pub use admin::{AdminService, AdminStats};
pub use gateway::Gateway;
pub use query::{EventPage, QueryService};
pub use queue::{EventQueue, MemoryQueue, QueueItem, RedisQueue, RedisQueueConfig};
pub use store::{EventStore, SqliteStore, StoreStats, UpsertOutcome};
pub use worker::{IngestWorker, StepOutcome, WorkerConfig};
