//! The ingestion worker: the only writer of scraper-originated events.
//!
//! The worker alternates between two states. Waiting: parked in
//! [`EventQueue::pop_blocking`]. Processing: decoding one payload and
//! applying its upsert. Each pass through [`IngestWorker::process_next`] is
//! one Waiting → Processing → Waiting step.
//!
//! # Failure handling
//!
//! - Malformed payloads can never succeed, so they are dropped.
//! - Transient store errors bump the item's `attempts` counter and requeue
//!   it at the tail, followed by an exponential backoff. Once `attempts`
//!   reaches `max_attempts` the item is dead-lettered instead.
//! - Permanent store errors dead-letter the item immediately.
//!
//! Shutdown is only observed between steps. A popped item is always carried
//! through to a store write, a requeue or a dead-letter before the loop
//! checks the token, and an upsert in flight is never cancelled.

use chrono::Utc;
use eventide_core::metrics::{
    WORKER_EVENTS_DEAD_LETTERED, WORKER_EVENTS_DROPPED, WORKER_EVENTS_REQUEUED,
    WORKER_EVENTS_UPSERTED, WORKER_RUNNING, WORKER_UPSERT_DURATION,
};
use metrics::{counter, gauge, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::queue::{EventQueue, QueueItem};
use crate::store::EventStore;
use crate::{Error, Result};

/// Pause after the queue itself fails.
const QUEUE_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// Worker tuning.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How long one blocking pop waits before the loop comes around again.
    pub pop_timeout: Duration,
    /// Store attempts an item gets before it is dead-lettered.
    pub max_attempts: u32,
    /// Backoff after the first failed attempt.
    pub backoff_base: Duration,
    /// Upper bound on any single backoff.
    pub backoff_max: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pop_timeout: Duration::from_secs(5),
            max_attempts: 5,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Backoff after the `attempts`-th failure: `base * 2^(attempts-1)`,
    /// capped at `backoff_max`.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        self.backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.backoff_max)
    }
}

/// What one step of the worker did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The pop timed out with nothing to do.
    Idle,
    /// The event was written to the store.
    Upserted { source_id: String, inserted: bool },
    /// The payload was malformed and discarded.
    Dropped,
    /// The store failed and the item went back to the queue tail.
    Requeued { source_id: String, attempts: u32 },
    /// The item left the processing path for the dead-letter list.
    DeadLettered { source_id: String, attempts: u32 },
}

impl StepOutcome {
    /// Attempt count when this step ended in a store failure.
    fn failed_attempts(&self) -> Option<u32> {
        match self {
            Self::Requeued { attempts, .. } | Self::DeadLettered { attempts, .. } => {
                Some(*attempts)
            }
            _ => None,
        }
    }
}

/// Drains the queue into the store.
pub struct IngestWorker {
    queue: Arc<dyn EventQueue>,
    store: Arc<dyn EventStore>,
    config: WorkerConfig,
}

impl IngestWorker {
    pub fn new(
        queue: Arc<dyn EventQueue>,
        store: Arc<dyn EventStore>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            store,
            config,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            queue = self.queue.name(),
            max_attempts = self.config.max_attempts,
            "ingestion worker started"
        );
        gauge!(WORKER_RUNNING).set(1.0);

        while !shutdown.is_cancelled() {
            let pause = match self.process_next().await {
                Ok(outcome) => outcome.failed_attempts().map(|n| self.config.backoff(n)),
                Err(e) => {
                    error!(error = %e, "queue operation failed");
                    Some(QUEUE_ERROR_PAUSE)
                }
            };

            if let Some(pause) = pause {
                debug!(?pause, "backing off");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }

        gauge!(WORKER_RUNNING).set(0.0);
        info!("ingestion worker stopped");
    }

    /// Wait for one payload and process it.
    ///
    /// Errors are queue errors only; store errors are absorbed into the
    /// outcome.
    pub async fn process_next(&self) -> Result<StepOutcome> {
        match self.queue.pop_blocking(self.config.pop_timeout).await? {
            Some(payload) => self.handle_payload(&payload).await,
            None => Ok(StepOutcome::Idle),
        }
    }

    /// Process one popped payload.
    pub async fn handle_payload(&self, payload: &str) -> Result<StepOutcome> {
        let mut item = match QueueItem::decode(payload) {
            Ok(item) => item,
            Err(e) => {
                warn!(error = %e, "dropping malformed queue item");
                counter!(WORKER_EVENTS_DROPPED).increment(1);
                return Ok(StepOutcome::Dropped);
            }
        };

        let started = Instant::now();
        let result = self.store.upsert(&item.event, Utc::now()).await;
        histogram!(WORKER_UPSERT_DURATION).record(started.elapsed().as_secs_f64());

        match result {
            Ok(outcome) => {
                let label = if outcome.inserted { "inserted" } else { "updated" };
                counter!(WORKER_EVENTS_UPSERTED, "outcome" => label).increment(1);
                debug!(
                    source_id = %item.event.source_id,
                    id = %outcome.id,
                    status = %outcome.status,
                    outcome = label,
                    "event stored"
                );
                Ok(StepOutcome::Upserted {
                    source_id: item.event.source_id,
                    inserted: outcome.inserted,
                })
            }
            Err(e) => {
                item.attempts = item.attempts.saturating_add(1);
                self.handle_store_failure(item, e).await
            }
        }
    }

    async fn handle_store_failure(&self, item: QueueItem, err: Error) -> Result<StepOutcome> {
        let source_id = item.event.source_id.clone();
        let attempts = item.attempts;
        let exhausted = !err.is_transient() || attempts >= self.config.max_attempts;
        let encoded = item.encode()?;

        if exhausted {
            warn!(
                source_id = %source_id,
                attempts,
                error = %err,
                "store rejected event, moving to dead-letter list"
            );
            if let Err(e) = self.queue.dead_letter(encoded).await {
                error!(source_id = %source_id, attempts, error = %e, "failed to dead-letter event, event lost");
                return Err(e);
            }
            counter!(WORKER_EVENTS_DEAD_LETTERED).increment(1);
            Ok(StepOutcome::DeadLettered {
                source_id,
                attempts,
            })
        } else {
            warn!(
                source_id = %source_id,
                attempts,
                error = %err,
                "store unavailable, requeueing event"
            );
            if let Err(e) = self.queue.requeue(encoded).await {
                error!(source_id = %source_id, attempts, error = %e, "failed to requeue event, event lost");
                return Err(e);
            }
            counter!(WORKER_EVENTS_REQUEUED).increment(1);
            Ok(StepOutcome::Requeued {
                source_id,
                attempts,
            })
        }
    }
}
