//! Persistent event store.
//!
//! The store is the system of record for processed events. It guarantees a
//! single record per `source_id` and owns record identity and timestamps.

mod schema;
mod sqlite;

pub use self::sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eventide_core::{EventFilter, EventRecord, EventStatus, NewEvent, PageRequest};
use serde::Serialize;

use crate::Result;

/// Result of an [`EventStore::upsert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Store identifier of the record, new or existing.
    pub id: String,
    /// True when no record with this `source_id` existed before.
    pub inserted: bool,
    /// Status after the write. A terminal status survives re-ingestion.
    pub status: EventStatus,
}

/// Aggregate counts over the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: u64,
    pub active: u64,
    pub cancelled: u64,
    /// Distinct producer names across all records, sorted.
    pub sources: Vec<String>,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert a new record or update the one sharing `event.source_id`.
    ///
    /// Atomic per `source_id`: concurrent upserts of the same key never
    /// produce two records.
    async fn upsert(&self, event: &NewEvent, now: DateTime<Utc>) -> Result<UpsertOutcome>;

    /// Active records matching `filter`, ordered by `date` then `source_id`.
    async fn list(&self, filter: &EventFilter, page: PageRequest) -> Result<Vec<EventRecord>>;

    /// Number of active records matching `filter`.
    async fn count(&self, filter: &EventFilter) -> Result<u64>;

    /// Fetch one record by store id, whatever its status.
    async fn get(&self, id: &str) -> Result<Option<EventRecord>>;

    /// Distinct `source` values across all records, whatever their status.
    async fn distinct_sources(&self) -> Result<Vec<String>>;

    /// Mark a record cancelled. Returns false when `id` is unknown.
    async fn cancel(&self, id: &str, now: DateTime<Utc>) -> Result<bool>;

    async fn stats(&self) -> Result<StoreStats>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<()>;
}
