//! Administrative operations: soft delete, statistics, dead-letter replay.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::queue::EventQueue;
use crate::store::EventStore;
use crate::Result;

/// Store counts plus queue depths.
#[derive(Debug, Clone, Serialize)]
pub struct AdminStats {
    pub total_events: u64,
    pub active_events: u64,
    pub cancelled_events: u64,
    pub sources_count: usize,
    pub sources: Vec<String>,
    /// `None` when the queue cannot be reached.
    pub queue_depth: Option<u64>,
    pub dead_letter_depth: Option<u64>,
}

#[derive(Clone)]
pub struct AdminService {
    queue: Arc<dyn EventQueue>,
    store: Arc<dyn EventStore>,
}

impl AdminService {
    pub fn new(queue: Arc<dyn EventQueue>, store: Arc<dyn EventStore>) -> Self {
        Self { queue, store }
    }

    /// Soft-delete an event. Returns false if nothing changed.
    pub async fn cancel(&self, id: &str) -> Result<bool> {
        let changed = self.store.cancel(id, Utc::now()).await?;
        if changed {
            info!(id, "event cancelled");
        }
        Ok(changed)
    }

    /// Store statistics are required; queue depths are best effort.
    pub async fn stats(&self) -> Result<AdminStats> {
        let (store, depth, dead) = tokio::join!(
            self.store.stats(),
            self.queue.len(),
            self.queue.dead_letter_len()
        );
        let store = store?;

        let depth = depth
            .inspect_err(|e| warn!(error = %e, "queue depth unavailable"))
            .ok();
        let dead = dead
            .inspect_err(|e| warn!(error = %e, "dead-letter depth unavailable"))
            .ok();

        Ok(AdminStats {
            total_events: store.total,
            active_events: store.active,
            cancelled_events: store.cancelled,
            sources_count: store.sources.len(),
            sources: store.sources,
            queue_depth: depth,
            dead_letter_depth: dead,
        })
    }

    /// Move up to `max` dead-lettered items back onto the main queue with
    /// their attempt counters reset. Items that no longer decode stay dead.
    pub async fn replay_dead_letters(&self, max: usize) -> Result<usize> {
        let count = self.queue.replay_dead_letters(max).await?;
        if count > 0 {
            info!(count, "replayed dead-lettered events");
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{MemoryQueue, QueueItem};
    use crate::store::SqliteStore;
    use crate::Error;
    use async_trait::async_trait;
    use eventide_core::{EventStatus, NewEvent};
    use std::time::Duration;

    /// Reads succeed from the wrapped queue; every write fails as if the
    /// backend had gone away.
    struct ReadOnlyQueue {
        inner: MemoryQueue,
    }

    fn gone() -> Error {
        Error::Unavailable("queue went away".to_string())
    }

    #[async_trait]
    impl EventQueue for ReadOnlyQueue {
        fn name(&self) -> &'static str {
            "read-only"
        }

        async fn push(&self, _payload: String) -> Result<()> {
            Err(gone())
        }

        async fn push_bulk(&self, _payloads: Vec<String>) -> Result<()> {
            Err(gone())
        }

        async fn pop_blocking(&self, _timeout: Duration) -> Result<Option<String>> {
            Err(gone())
        }

        async fn requeue(&self, _payload: String) -> Result<()> {
            Err(gone())
        }

        async fn dead_letter(&self, _payload: String) -> Result<()> {
            Err(gone())
        }

        async fn replay_dead_letters(&self, _max: usize) -> Result<usize> {
            Err(gone())
        }

        async fn len(&self) -> Result<u64> {
            self.inner.len().await
        }

        async fn dead_letter_len(&self) -> Result<u64> {
            Err(gone())
        }

        async fn ping(&self) -> Result<()> {
            Err(gone())
        }
    }

    fn event(source_id: &str) -> NewEvent {
        NewEvent {
            source_id: source_id.to_string(),
            title: "Book Club".to_string(),
            description: "Monthly meeting".to_string(),
            location: "Library".to_string(),
            date: "2025-09-10".to_string(),
            time: None,
            source: "library".to_string(),
            source_url: "https://library.example.com/club".to_string(),
            price: None,
            image_url: None,
            tags: vec![],
        }
    }

    fn service() -> (Arc<MemoryQueue>, Arc<SqliteStore>, AdminService) {
        let queue = Arc::new(MemoryQueue::new());
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let admin = AdminService::new(queue.clone(), store.clone());
        (queue, store, admin)
    }

    #[tokio::test]
    async fn test_cancel_and_stats() {
        let (queue, store, admin) = service();
        let a = store.upsert(&event("a"), Utc::now()).await.unwrap();
        store.upsert(&event("b"), Utc::now()).await.unwrap();
        queue.push("pending".to_string()).await.unwrap();

        assert!(admin.cancel(&a.id).await.unwrap());
        assert!(!admin.cancel(&a.id).await.unwrap());
        assert_eq!(
            store.get(&a.id).await.unwrap().unwrap().status,
            EventStatus::Cancelled
        );

        let stats = admin.stats().await.unwrap();
        assert_eq!(stats.total_events, 2);
        assert_eq!(stats.active_events, 1);
        assert_eq!(stats.cancelled_events, 1);
        assert_eq!(stats.sources, vec!["library".to_string()]);
        assert_eq!(stats.sources_count, 1);
        assert_eq!(stats.queue_depth, Some(1));
        assert_eq!(stats.dead_letter_depth, Some(0));
    }

    #[tokio::test]
    async fn test_replay_resets_attempts() {
        let (queue, _store, admin) = service();
        let mut item = QueueItem::new(event("dead"));
        item.attempts = 5;
        queue.dead_letter(item.encode().unwrap()).await.unwrap();
        queue.dead_letter("{corrupt".to_string()).await.unwrap();

        let replayed = admin.replay_dead_letters(10).await.unwrap();
        assert_eq!(replayed, 1);

        let queued = queue.snapshot();
        assert_eq!(queued.len(), 1);
        let back = QueueItem::decode(&queued[0]).unwrap();
        assert_eq!(back.event.source_id, "dead");
        assert_eq!(back.attempts, 0);
        assert_eq!(queue.dead_letters(), vec!["{corrupt".to_string()]);
    }

    #[tokio::test]
    async fn test_replay_respects_max() {
        let (queue, _store, admin) = service();
        for id in ["a", "b", "c"] {
            let payload = QueueItem::new(event(id)).encode().unwrap();
            queue.dead_letter(payload).await.unwrap();
        }

        assert_eq!(admin.replay_dead_letters(2).await.unwrap(), 2);
        assert_eq!(queue.len().await.unwrap(), 2);
        assert_eq!(queue.dead_letter_len().await.unwrap(), 1);
        assert_eq!(admin.replay_dead_letters(0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_replay_keeps_dead_letters() {
        let inner = MemoryQueue::new();
        for id in ["a", "b", "c"] {
            let payload = QueueItem::new(event(id)).encode().unwrap();
            inner.dead_letter(payload).await.unwrap();
        }
        let queue = Arc::new(ReadOnlyQueue { inner });
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let admin = AdminService::new(queue.clone(), store);

        let err = admin.replay_dead_letters(10).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(queue.inner.dead_letters().len(), 3);
        assert!(queue.inner.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_stats_report_unknown_dead_letter_depth() {
        let queue = Arc::new(ReadOnlyQueue {
            inner: MemoryQueue::new(),
        });
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.upsert(&event("a"), Utc::now()).await.unwrap();
        let admin = AdminService::new(queue, store);

        let stats = admin.stats().await.unwrap();
        assert_eq!(stats.total_events, 1);
        assert_eq!(stats.queue_depth, Some(0));
        assert_eq!(stats.dead_letter_depth, None);
    }
}
