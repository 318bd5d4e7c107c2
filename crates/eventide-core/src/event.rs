//! Event data model.
//!
//! Two shapes exist for the same event:
//! - [`NewEvent`] is what producers submit and what travels through the queue.
//!   It has no store-assigned identity or timestamps.
//! - [`EventRecord`] is the persisted document, keyed by a store-assigned `id`
//!   and unique on the producer-assigned `source_id`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Error, FieldError, Result};
use crate::DATE_FORMAT;

/// Lifecycle status of a stored event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    /// Scraper-originated records enter as active.
    #[default]
    Active,
    Cancelled,
    Completed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }

    /// Terminal statuses are owned by administrators; ingestion never
    /// overwrites them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed)
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "cancelled" => Ok(Self::Cancelled),
            "completed" => Ok(Self::Completed),
            _ => Err(()),
        }
    }
}

/// An event as submitted by a producer.
///
/// Missing string fields deserialize as empty so that [`NewEvent::validate`]
/// can report every absent field at once instead of failing on the first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewEvent {
    /// Producer-assigned natural key, used for deduplication.
    pub source_id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    /// Calendar date, `YYYY-MM-DD`.
    pub date: String,
    /// Optional clock time, free-form (e.g. `"19:30"`).
    pub time: Option<String>,
    /// Producer name (e.g. `"eventbrite"`).
    pub source: String,
    pub source_url: String,
    pub price: Option<f64>,
    pub image_url: Option<String>,
    /// Set semantics: order is irrelevant and duplicates carry no meaning.
    pub tags: Vec<String>,
}

impl NewEvent {
    /// Parse a submission from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let event: Self = serde_json::from_str(json)?;
        let event = event.normalize();
        event.validate()?;
        Ok(event)
    }

    /// Check required fields and value ranges.
    ///
    /// Collects every problem rather than stopping at the first one.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        let required = [
            ("source_id", &self.source_id),
            ("title", &self.title),
            ("description", &self.description),
            ("location", &self.location),
            ("date", &self.date),
            ("source", &self.source),
            ("source_url", &self.source_url),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                problems.push(FieldError::new(field, "is required and must not be empty"));
            }
        }

        if !self.date.trim().is_empty() && parse_date(&self.date).is_none() {
            problems.push(FieldError::new(
                "date",
                format!("'{}' is not a calendar date (expected YYYY-MM-DD)", self.date),
            ));
        }

        if let Some(price) = self.price {
            if !price.is_finite() {
                problems.push(FieldError::new("price", "must be a finite number"));
            } else if price < 0.0 {
                problems.push(FieldError::new("price", "must not be negative"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidEvent { problems })
        }
    }

    /// Trim text fields, drop blank optionals and reduce tags to a sorted set.
    ///
    /// A parseable `date` is rewritten in zero-padded form so stored dates
    /// compare correctly as text.
    pub fn normalize(mut self) -> Self {
        for field in [
            &mut self.source_id,
            &mut self.title,
            &mut self.description,
            &mut self.location,
            &mut self.date,
            &mut self.source,
            &mut self.source_url,
        ] {
            let trimmed = field.trim();
            if trimmed.len() != field.len() {
                *field = trimmed.to_string();
            }
        }

        if let Some(date) = parse_date(&self.date) {
            self.date = date.format(DATE_FORMAT).to_string();
        }

        self.time = trim_optional(self.time);
        self.image_url = trim_optional(self.image_url);

        let mut tags: Vec<String> = self
            .tags
            .into_iter()
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect();
        tags.sort();
        tags.dedup();
        self.tags = tags;

        self
    }
}

fn trim_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a `YYYY-MM-DD` calendar date.
pub(crate) fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

/// A persisted event document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Store-assigned opaque identifier, immutable after first insert.
    pub id: String,
    pub source_id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub date: String,
    pub time: Option<String>,
    pub source: String,
    pub source_url: String,
    pub price: Option<f64>,
    pub image_url: Option<String>,
    pub tags: Vec<String>,
    pub status: EventStatus,
    /// Set once, at the first successful write.
    pub created_at: DateTime<Utc>,
    /// Refreshed on every successful write.
    pub updated_at: DateTime<Utc>,
}
