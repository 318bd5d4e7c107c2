//! Read side: filtered, paginated views of the store.

use eventide_core::{EventFilter, EventRecord, PageRequest};
use serde::Serialize;
use std::sync::Arc;

use crate::store::EventStore;
use crate::Result;

/// One page of active events plus the size of the whole result set.
#[derive(Debug, Clone, Serialize)]
pub struct EventPage {
    pub data: Vec<EventRecord>,
    /// Matching records ignoring `skip`/`limit`.
    pub total: u64,
    pub skip: u64,
    pub limit: u32,
    /// `ceil(total / limit)`.
    pub pages: u64,
}

#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn EventStore>,
}

impl QueryService {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// List active events matching `filter`.
    ///
    /// The page and the total are two independent reads and may reflect
    /// different snapshots under concurrent writes.
    pub async fn list(&self, filter: EventFilter, page: PageRequest) -> Result<EventPage> {
        let filter = filter.normalize();
        filter.validate()?;

        let (data, total) = tokio::join!(self.store.list(&filter, page), self.store.count(&filter));
        let (data, total) = (data?, total?);

        Ok(EventPage {
            data,
            total,
            skip: page.skip,
            limit: page.limit,
            pages: page.pages(total),
        })
    }

    /// Look up one event by id, cancelled or not.
    pub async fn get(&self, id: &str) -> Result<Option<EventRecord>> {
        self.store.get(id).await
    }

    pub async fn distinct_sources(&self) -> Result<Vec<String>> {
        self.store.distinct_sources().await
    }
}
