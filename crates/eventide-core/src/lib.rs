//! Core types, validation, and shared utilities for the Eventide ingestion pipeline.
//!
//! This crate provides:
//! - The event data model (submissions, stored records, lifecycle status)
//! - Submission validation and normalization
//! - Query-time filters and pagination arithmetic
//! - Prometheus metrics helpers
//! - Shared error types

mod error;
mod event;
mod filter;
pub mod metrics;

// ═══════════════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════════════

/// Calendar date layout accepted for `date`, `date_from` and `date_to`.
///
/// Dates are stored as text in this layout, so lexicographic order equals
/// chronological order.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Default page size for list queries.
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

/// Largest page size a caller may request.
pub const MAX_PAGE_LIMIT: u32 = 100;

pub use error::{Error, FieldError, Result};
pub use event::{EventRecord, EventStatus, NewEvent};
pub use filter::{EventFilter, PageRequest, page_count};
