//! Error types for the Eventide pipeline.

use serde::Serialize;
use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// A single problem found while validating one field of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// The name of the offending field.
    pub field: &'static str,
    /// Description of what's wrong.
    pub reason: String,
}

impl FieldError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Errors that can occur while validating or decoding events.
#[derive(Error, Debug)]
pub enum Error {
    /// Event submission failed validation.
    #[error("invalid event: {}", join_problems(.problems))]
    InvalidEvent {
        /// Every problem found, in field order.
        problems: Vec<FieldError>,
    },

    /// Query filter is malformed (bad date, inverted range).
    #[error("invalid filter '{field}': {reason}")]
    InvalidFilter {
        /// The name of the invalid filter field.
        field: &'static str,
        /// Description of what's wrong.
        reason: String,
    },

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn join_problems(problems: &[FieldError]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
