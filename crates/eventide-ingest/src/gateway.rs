//! Producer gateway: validates submissions and puts them on the queue.
//!
//! Acceptance means "on the queue", not "in the store". The gateway never
//! touches the store and never stamps timestamps; both belong to the worker.

use eventide_core::metrics::{GATEWAY_EVENTS_QUEUED, GATEWAY_EVENTS_REJECTED};
use eventide_core::NewEvent;
use metrics::counter;
use std::sync::Arc;
use tracing::debug;

use crate::error::RejectedEvent;
use crate::queue::{EventQueue, QueueItem};
use crate::{Error, Result};

#[derive(Clone)]
pub struct Gateway {
    queue: Arc<dyn EventQueue>,
}

impl Gateway {
    pub fn new(queue: Arc<dyn EventQueue>) -> Self {
        Self { queue }
    }

    /// Validate one event and enqueue it.
    ///
    /// Returns the normalized event as it was queued.
    pub async fn submit_one(&self, event: NewEvent) -> Result<NewEvent> {
        let event = event.normalize();
        if let Err(e) = event.validate() {
            counter!(GATEWAY_EVENTS_REJECTED).increment(1);
            return Err(e.into());
        }

        let payload = QueueItem::new(event.clone()).encode()?;
        self.queue.push(payload).await?;

        counter!(GATEWAY_EVENTS_QUEUED).increment(1);
        debug!(source_id = %event.source_id, "event queued");
        Ok(event)
    }

    /// Validate every event and enqueue them all, or none.
    ///
    /// A single invalid event rejects the whole batch; the error lists every
    /// invalid member with its position.
    pub async fn submit_bulk(&self, events: Vec<NewEvent>) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        let events: Vec<NewEvent> = events.into_iter().map(NewEvent::normalize).collect();
        let rejected: Vec<RejectedEvent> = events
            .iter()
            .enumerate()
            .filter_map(|(index, event)| match event.validate() {
                Ok(()) => None,
                Err(eventide_core::Error::InvalidEvent { problems }) => Some(RejectedEvent {
                    index,
                    source_id: event.source_id.clone(),
                    problems,
                }),
                Err(other) => Some(RejectedEvent {
                    index,
                    source_id: event.source_id.clone(),
                    problems: vec![eventide_core::FieldError::new("event", other.to_string())],
                }),
            })
            .collect();

        if !rejected.is_empty() {
            counter!(GATEWAY_EVENTS_REJECTED).increment(events.len() as u64);
            return Err(Error::InvalidBatch { rejected });
        }

        let payloads = events
            .into_iter()
            .map(|event| QueueItem::new(event).encode())
            .collect::<Result<Vec<_>>>()?;
        let count = payloads.len();
        self.queue.push_bulk(payloads).await?;

        counter!(GATEWAY_EVENTS_QUEUED).increment(count as u64);
        debug!(count, "bulk events queued");
        Ok(count)
    }
}
