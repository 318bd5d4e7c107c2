//! Durable work queue between the gateway and the worker.
//!
//! Items are opaque strings to the queue itself. The pipeline encodes them as
//! [`QueueItem`]: the submitted event object with an optional `attempts`
//! counter merged in. A fresh submission carries no counter, so its wire
//! form is exactly the submission JSON.
//!
//! # Available Backends
//!
//! - [`RedisQueue`] - Redis lists (RPUSH / BLPOP), used in production
//! - [`MemoryQueue`] - process-local, used in tests and single-process demos

mod memory;
mod redis;

pub use self::memory::MemoryQueue;
pub use self::redis::{RedisQueue, RedisQueueConfig};

use async_trait::async_trait;
use eventide_core::NewEvent;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::Result;

/// A FIFO queue of serialized event payloads.
///
/// Single consumer, no priorities, no acknowledgement tokens: once popped,
/// an item exists only in the consumer's hands until it is stored,
/// requeued or dead-lettered.
#[async_trait]
pub trait EventQueue: Send + Sync {
    /// Backend name for logs and health reports.
    fn name(&self) -> &'static str;

    /// Append one payload to the tail.
    async fn push(&self, payload: String) -> Result<()>;

    /// Append all payloads in order, all-or-nothing.
    async fn push_bulk(&self, payloads: Vec<String>) -> Result<()>;

    /// Remove and return the head, waiting up to `timeout` for one to arrive.
    ///
    /// `Ok(None)` means the wait expired; it is not an error.
    async fn pop_blocking(&self, timeout: Duration) -> Result<Option<String>>;

    /// Re-append a previously popped payload to the tail (not the head), so a
    /// failing item cannot block the items queued behind it.
    async fn requeue(&self, payload: String) -> Result<()>;

    /// Move a payload to the dead-letter list, out of the processing path.
    async fn dead_letter(&self, payload: String) -> Result<()>;

    /// Move up to `max` payloads from the head of the dead-letter list back
    /// onto the main queue with their attempt counters reset.
    ///
    /// The move is atomic per backend: a payload is either still dead or
    /// already queued, never in neither list. Payloads that no longer decode
    /// are rotated to the tail of the dead-letter list. Returns how many
    /// payloads were queued.
    async fn replay_dead_letters(&self, max: usize) -> Result<usize>;

    /// Number of payloads waiting in the main queue.
    async fn len(&self) -> Result<u64>;

    /// Number of payloads in the dead-letter list.
    async fn dead_letter_len(&self) -> Result<u64>;

    /// Check connectivity to the backing service.
    async fn ping(&self) -> Result<()>;
}

/// Wire form of a queued event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    #[serde(flatten)]
    pub event: NewEvent,

    /// Failed store attempts so far.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub attempts: u32,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl QueueItem {
    /// Wrap a fresh submission.
    pub fn new(event: NewEvent) -> Self {
        Self { event, attempts: 0 }
    }

    /// Serialize for the queue.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a popped payload, normalizing and validating the event.
    ///
    /// Any error here is permanent: the payload can never be stored.
    pub fn decode(payload: &str) -> Result<Self> {
        let item: Self = serde_json::from_str(payload)?;
        let event = item.event.normalize();
        event.validate()?;
        Ok(Self {
            event,
            attempts: item.attempts,
        })
    }
}

/// Re-encode a dead-lettered payload for another round of attempts.
///
/// `None` means the payload cannot be replayed and should stay dead.
fn replay_form(payload: &str) -> Option<String> {
    let mut item = match QueueItem::decode(payload) {
        Ok(item) => item,
        Err(e) => {
            warn!(error = %e, "dead-lettered item is malformed, keeping it");
            return None;
        }
    };
    item.attempts = 0;
    match item.encode() {
        Ok(fresh) => Some(fresh),
        Err(e) => {
            warn!(source_id = %item.event.source_id, error = %e, "cannot re-encode dead-lettered item");
            None
        }
    }
}
