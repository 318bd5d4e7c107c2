//! Query-time filters and pagination.
//!
//! Filters are never persisted. Every present field becomes an independent
//! predicate and all predicates are AND-ed together; an empty filter only
//! restricts results to active events.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::event::parse_date;
use crate::{DATE_FORMAT, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};

/// Filter over active events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventFilter {
    /// Inclusive lower bound on `date` (`YYYY-MM-DD`).
    pub date_from: Option<String>,
    /// Inclusive upper bound on `date` (`YYYY-MM-DD`).
    pub date_to: Option<String>,
    /// Case-insensitive substring of `location`.
    pub location: Option<String>,
    /// Exact producer name.
    pub source: Option<String>,
    /// Match-any: an event matches if it carries at least one of these tags.
    pub tags: Vec<String>,
    /// Inclusive lower bound on `price`.
    pub price_min: Option<f64>,
    /// Inclusive upper bound on `price`.
    pub price_max: Option<f64>,
}

impl EventFilter {
    /// True when no predicate beyond `status = active` applies.
    pub fn is_empty(&self) -> bool {
        self.date_from.is_none()
            && self.date_to.is_none()
            && self.location.is_none()
            && self.source.is_none()
            && self.tags.is_empty()
            && self.price_min.is_none()
            && self.price_max.is_none()
    }

    /// Drop blank text values and blank tags, zero-pad parseable dates.
    pub fn normalize(mut self) -> Self {
        let blank_to_none = |v: Option<String>| {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        };
        let canonical_date = |v: Option<String>| {
            blank_to_none(v).map(|s| match parse_date(&s) {
                Some(date) => date.format(DATE_FORMAT).to_string(),
                None => s,
            })
        };
        self.date_from = canonical_date(self.date_from);
        self.date_to = canonical_date(self.date_to);
        self.location = blank_to_none(self.location);
        self.source = blank_to_none(self.source);
        self.tags = self
            .tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        self
    }

    /// Reject malformed dates, non-finite prices and inverted ranges.
    pub fn validate(&self) -> Result<()> {
        let from = match &self.date_from {
            Some(value) => Some(parse_date(value).ok_or_else(|| bad_date("date_from", value))?),
            None => None,
        };
        let to = match &self.date_to {
            Some(value) => Some(parse_date(value).ok_or_else(|| bad_date("date_to", value))?),
            None => None,
        };
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(Error::InvalidFilter {
                    field: "date_from",
                    reason: format!("{from} is after date_to {to}"),
                });
            }
        }

        for (field, value) in [("price_min", self.price_min), ("price_max", self.price_max)] {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(Error::InvalidFilter {
                        field,
                        reason: "must be a finite number".to_string(),
                    });
                }
            }
        }
        if let (Some(min), Some(max)) = (self.price_min, self.price_max) {
            if min > max {
                return Err(Error::InvalidFilter {
                    field: "price_min",
                    reason: format!("{min} is greater than price_max {max}"),
                });
            }
        }

        Ok(())
    }
}

fn bad_date(field: &'static str, value: &str) -> Error {
    Error::InvalidFilter {
        field,
        reason: format!("'{value}' is not a calendar date (expected YYYY-MM-DD)"),
    }
}

/// A page window over an ordered result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Records to skip from the start of the ordered result set.
    pub skip: u64,
    /// Maximum records to return, always within `1..=MAX_PAGE_LIMIT`.
    pub limit: u32,
}

impl PageRequest {
    /// Build a page window, defaulting and clamping `limit`.
    pub fn new(skip: Option<u64>, limit: Option<u32>) -> Self {
        Self {
            skip: skip.unwrap_or(0),
            limit: limit
                .unwrap_or(DEFAULT_PAGE_LIMIT)
                .clamp(1, MAX_PAGE_LIMIT),
        }
    }

    /// Number of pages needed to show `total` records at this page size.
    pub fn pages(&self, total: u64) -> u64 {
        page_count(total, self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// `ceil(total / limit)`, with a zero limit treated as one.
pub fn page_count(total: u64, limit: u32) -> u64 {
    total.div_ceil(u64::from(limit.max(1)))
}
