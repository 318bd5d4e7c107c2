//! Eventide Serve - HTTP API for event producers and readers
//!
//! Scrapers submit events here; the website reads them back. Submissions are
//! only validated and queued by this crate. Storing them is the ingestion
//! worker's job, which `eventide-serve` embeds by default.
//!
//! # Authentication
//!
//! Producer and read endpoints are public. Admin endpoints (cancel, stats,
//! dead-letter replay) require a Bearer token when `EVENTIDE_ADMIN_TOKENS`
//! is set and are open otherwise.
//!
//! # Architecture
//!
//! - **AppState**: queue and store handles plus the services built on them
//! - **Auth**: Bearer token middleware for admin routes
//! - **Routes**: endpoint handlers grouped by audience

mod auth;
mod error;
mod routes;
mod state;

pub use self::auth::require_admin;
pub use self::error::ApiError;
pub use self::routes::router;
pub use self::state::{AppState, Config};
