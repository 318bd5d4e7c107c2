//! Admin endpoints. All of them sit behind [`crate::auth::require_admin`].

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use eventide_ingest::AdminStats;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_REPLAY_MAX: usize = 100;
const MAX_REPLAY_MAX: usize = 1000;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    status: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    status: &'static str,
    stats: AdminStats,
}

#[derive(Debug, Deserialize)]
pub struct ReplayQuery {
    /// Items to replay (default: 100, max: 1000).
    pub max: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ReplayResponse {
    status: &'static str,
    replayed: usize,
}

/// `DELETE /events/{id}`
///
/// Soft delete. Cancelling an unknown or already-cancelled event is a 404
/// because nothing changed.
pub async fn cancel_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !state.admin.cancel(&id).await? {
        return Err(ApiError::NotFound(format!("event {id}")));
    }

    Ok(Json(MessageResponse {
        status: "success",
        message: format!("Event {id} cancelled"),
    }))
}

/// `GET /admin/stats`
pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let stats = state.admin.stats().await?;
    Ok(Json(StatsResponse {
        status: "success",
        stats,
    }))
}

/// `POST /admin/dead-letter/replay?max=N`
///
/// Moves dead-lettered events back onto the main queue with fresh retry
/// budgets.
pub async fn replay_dead_letters(
    State(state): State<AppState>,
    params: Result<Query<ReplayQuery>, QueryRejection>,
) -> Result<Json<ReplayResponse>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let max = params
        .max
        .unwrap_or(DEFAULT_REPLAY_MAX)
        .clamp(1, MAX_REPLAY_MAX);
    let replayed = state.admin.replay_dead_letters(max).await?;

    Ok(Json(ReplayResponse {
        status: "success",
        replayed,
    }))
}
