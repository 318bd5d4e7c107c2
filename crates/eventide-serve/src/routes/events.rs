//! Producer and reader endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use eventide_core::{EventFilter, EventRecord, NewEvent, PageRequest};
use serde::Serialize;
use std::str::FromStr;

use crate::error::ApiError;
use crate::state::AppState;

/// Response to a single submission.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    status: &'static str,
    message: &'static str,
    /// The event as queued, after normalization.
    event: NewEvent,
}

/// Response to a bulk submission.
#[derive(Debug, Serialize)]
pub struct BulkResponse {
    status: &'static str,
    message: String,
    count: usize,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    skip: u64,
    limit: u32,
    total: u64,
    pages: u64,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    status: &'static str,
    data: Vec<EventRecord>,
    pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    status: &'static str,
    data: T,
}

/// `POST /events`
///
/// Validates one event and queues it for ingestion. Success means the event
/// is on the queue, not yet in the store.
pub async fn submit_event(
    State(state): State<AppState>,
    payload: Result<Json<NewEvent>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let Json(event) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let event = state.gateway.submit_one(event).await?;

    Ok(Json(SubmitResponse {
        status: "queued",
        message: "Event added to processing queue",
        event,
    }))
}

/// `POST /events/bulk`
///
/// Queues every event or none of them.
pub async fn submit_bulk(
    State(state): State<AppState>,
    payload: Result<Json<Vec<NewEvent>>, JsonRejection>,
) -> Result<Json<BulkResponse>, ApiError> {
    let Json(events) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let count = state.gateway.submit_bulk(events).await?;

    Ok(Json(BulkResponse {
        status: "queued",
        message: format!("{count} events added to processing queue"),
        count,
    }))
}

/// `GET /events`
///
/// Query parameters: `skip`, `limit` (1-100, default 20), `date_from`,
/// `date_to`, `location`, `source`, `price_min`, `price_max`, and `tags`
/// (repeatable, also accepted as `tags[]`).
pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<ListResponse>, ApiError> {
    let (filter, page) = parse_list_params(&params)?;
    let page = state.query.list(filter, page).await?;

    Ok(Json(ListResponse {
        status: "success",
        data: page.data,
        pagination: Pagination {
            skip: page.skip,
            limit: page.limit,
            total: page.total,
            pages: page.pages,
        },
    }))
}

/// `GET /events/{id}`
///
/// Returns the event whatever its status, so cancelled events stay
/// reachable by id.
pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<EventRecord>>, ApiError> {
    let event = state
        .query
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("event {id}")))?;

    Ok(Json(DataResponse {
        status: "success",
        data: event,
    }))
}

/// `GET /sources`
pub async fn list_sources(
    State(state): State<AppState>,
) -> Result<Json<DataResponse<Vec<String>>>, ApiError> {
    let sources = state.query.distinct_sources().await?;
    Ok(Json(DataResponse {
        status: "success",
        data: sources,
    }))
}

fn parse_list_params(params: &[(String, String)]) -> Result<(EventFilter, PageRequest), ApiError> {
    let mut filter = EventFilter::default();
    let mut skip = None;
    let mut limit = None;

    for (key, value) in params {
        match key.as_str() {
            "skip" => skip = Some(parse_param(key, value)?),
            "limit" => limit = Some(parse_param(key, value)?),
            "date_from" => filter.date_from = Some(value.clone()),
            "date_to" => filter.date_to = Some(value.clone()),
            "location" => filter.location = Some(value.clone()),
            "source" => filter.source = Some(value.clone()),
            "tags" | "tags[]" => filter.tags.push(value.clone()),
            "price_min" => filter.price_min = Some(parse_param(key, value)?),
            "price_max" => filter.price_max = Some(parse_param(key, value)?),
            _ => {}
        }
    }

    Ok((filter, PageRequest::new(skip, limit)))
}

fn parse_param<T: FromStr>(key: &str, value: &str) -> Result<T, ApiError> {
    value
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid value for {key}: '{value}'")))
}
