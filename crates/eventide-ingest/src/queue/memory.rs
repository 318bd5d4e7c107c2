//! In-process queue backend.
//!
//! Nothing survives a restart, so this is only for tests and local demos.
//! Blocking pops park on a [`Notify`] instead of polling.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{replay_form, EventQueue};
use crate::Result;

/// Queue held in process memory.
#[derive(Default)]
pub struct MemoryQueue {
    items: Mutex<VecDeque<String>>,
    dead: Mutex<VecDeque<String>>,
    available: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the queued payloads, head first.
    pub fn snapshot(&self) -> Vec<String> {
        self.items.lock().iter().cloned().collect()
    }

    /// Copy of the dead-lettered payloads, oldest first.
    pub fn dead_letters(&self) -> Vec<String> {
        self.dead.lock().iter().cloned().collect()
    }
}

#[async_trait]
impl EventQueue for MemoryQueue {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn push(&self, payload: String) -> Result<()> {
        self.items.lock().push_back(payload);
        self.available.notify_one();
        Ok(())
    }

    async fn push_bulk(&self, payloads: Vec<String>) -> Result<()> {
        if payloads.is_empty() {
            return Ok(());
        }
        self.items.lock().extend(payloads);
        self.available.notify_one();
        Ok(())
    }

    async fn pop_blocking(&self, timeout: Duration) -> Result<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking so a push between the check
            // and the wait is not missed.
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next = self.items.lock().pop_front();
            if let Some(payload) = next {
                return Ok(Some(payload));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn requeue(&self, payload: String) -> Result<()> {
        self.push(payload).await
    }

    async fn dead_letter(&self, payload: String) -> Result<()> {
        self.dead.lock().push_back(payload);
        Ok(())
    }

    async fn replay_dead_letters(&self, max: usize) -> Result<usize> {
        let moved = {
            let mut dead = self.dead.lock();
            let mut items = self.items.lock();
            let n = max.min(dead.len());
            let mut moved = 0;
            for payload in dead.drain(..n).collect::<Vec<_>>() {
                match replay_form(&payload) {
                    Some(fresh) => {
                        items.push_back(fresh);
                        moved += 1;
                    }
                    None => dead.push_back(payload),
                }
            }
            moved
        };

        if moved > 0 {
            self.available.notify_one();
        }
        Ok(moved)
    }

    async fn len(&self) -> Result<u64> {
        Ok(self.items.lock().len() as u64)
    }

    async fn dead_letter_len(&self) -> Result<u64> {
        Ok(self.dead.lock().len() as u64)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
