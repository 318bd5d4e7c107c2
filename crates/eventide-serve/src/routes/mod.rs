//! API route definitions.

mod admin;
mod events;
mod health;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::auth::require_admin;
use crate::state::AppState;

/// Build the complete API router.
///
/// # Route Structure
///
/// ## Public
/// - `GET /` - Service info
/// - `GET /health` - Queue and store connectivity (200 or 503)
/// - `GET /health/live` - Process liveness
///
/// ### Producers
/// - `POST /events` - Queue one event
/// - `POST /events/bulk` - Queue a batch of events, all or nothing
///
/// ### Readers
/// - `GET /events` - Filtered, paginated active events
/// - `GET /events/{id}` - One event by id, any status
/// - `GET /sources` - Distinct producer names
///
/// ## Admin (Bearer token when configured)
/// - `DELETE /events/{id}` - Soft delete
/// - `GET /admin/stats` - Store counts and queue depths
/// - `POST /admin/dead-letter/replay` - Requeue dead-lettered events
pub fn router(state: AppState) -> Router {
    let admin_auth = middleware::from_fn_with_state(state.clone(), require_admin);

    let admin = Router::new()
        .route("/stats", get(admin::stats))
        .route("/dead-letter/replay", post(admin::replay_dead_letters))
        .route_layer(admin_auth.clone());

    Router::new()
        .route("/", get(info))
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::liveness))
        .route(
            "/events",
            get(events::list_events).post(events::submit_event),
        )
        .route("/events/bulk", post(events::submit_bulk))
        .route(
            "/events/{id}",
            get(events::get_event).merge(delete(admin::cancel_event).route_layer(admin_auth)),
        )
        .route("/sources", get(events::list_sources))
        .nest("/admin", admin)
        .with_state(state)
}

/// `GET /`
async fn info() -> Json<Value> {
    Json(json!({
        "name": "eventide",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "producers": {
                "submit_event": "POST /events",
                "submit_bulk": "POST /events/bulk",
            },
            "readers": {
                "list_events": "GET /events",
                "get_event": "GET /events/{id}",
                "sources": "GET /sources",
            },
            "admin": {
                "cancel_event": "DELETE /events/{id}",
                "stats": "GET /admin/stats",
                "replay_dead_letters": "POST /admin/dead-letter/replay",
            },
            "health": {
                "readiness": "GET /health",
                "liveness": "GET /health/live",
            },
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Config;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono::Utc;
    use eventide_core::NewEvent;
    use eventide_ingest::{
        EventQueue, EventStore, IngestWorker, MemoryQueue, QueueItem, SqliteStore, StepOutcome,
        WorkerConfig,
    };
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        queue: Arc<MemoryQueue>,
        store: Arc<SqliteStore>,
    }

    impl TestApp {
        fn new(admin_tokens: &[&str]) -> Self {
            let queue = Arc::new(MemoryQueue::new());
            let store = Arc::new(SqliteStore::open_in_memory().unwrap());
            let config = Config {
                admin_tokens: admin_tokens.iter().map(|t| t.to_string()).collect(),
                ..Config::default()
            };
            let state = AppState::with_backends(config, queue.clone(), store.clone());
            Self {
                router: router(state),
                queue,
                store,
            }
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let body = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, body)
        }

        async fn get(&self, uri: &str) -> (StatusCode, Value) {
            self.send(Request::get(uri).body(Body::empty()).unwrap()).await
        }

        async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
            let request = Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap();
            self.send(request).await
        }

        /// Run the worker until the queue is empty.
        async fn drain(&self) {
            let worker = IngestWorker::new(
                self.queue.clone(),
                self.store.clone(),
                WorkerConfig {
                    pop_timeout: Duration::from_millis(10),
                    ..Default::default()
                },
            );
            while worker.process_next().await.unwrap() != StepOutcome::Idle {}
        }
    }

    fn event_json(source_id: &str, date: &str, tags: &[&str]) -> Value {
        json!({
            "source_id": source_id,
            "title": format!("Show {source_id}"),
            "description": "Live music",
            "location": "Nashville, TN",
            "date": date,
            "time": "20:00",
            "source": "venue",
            "source_url": format!("https://venue.example.com/{source_id}"),
            "price": 15.0,
            "tags": tags,
        })
    }

    async fn seed(app: &TestApp, source_id: &str, date: &str, tags: &[&str]) -> String {
        let event: NewEvent = serde_json::from_value(event_json(source_id, date, tags)).unwrap();
        app.store
            .upsert(&event.normalize(), Utc::now())
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_info_and_liveness() {
        let app = TestApp::new(&[]);

        let (status, body) = app.get("/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "eventide");

        let (status, body) = app.get("/health/live").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_health_reports_both_backends() {
        let app = TestApp::new(&[]);
        let (status, body) = app.get("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["queue"], "connected");
        assert_eq!(body["store"], "connected");
    }

    #[tokio::test]
    async fn test_submit_event_queues_and_echoes() {
        let app = TestApp::new(&[]);
        let (status, body) = app
            .post_json("/events", event_json("s1", "2025-06-15", &["rock", "rock"]))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "queued");
        assert_eq!(body["event"]["source_id"], "s1");
        assert_eq!(body["event"]["tags"], json!(["rock"]));
        assert!(body["event"].get("id").is_none());
        assert_eq!(app.queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_submit_event_validation_errors() {
        let app = TestApp::new(&[]);

        let mut missing = event_json("s1", "2025-06-15", &[]);
        missing["source_id"] = json!("");
        missing["price"] = json!(-3);
        let (status, body) = app.post_json("/events", missing).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
        let fields: Vec<_> = body["details"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["field"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(fields, vec!["source_id", "price"]);

        let request = Request::post("/events")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"source_id\": "))
            .unwrap();
        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");

        assert_eq!(app.queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bulk_submission() {
        let app = TestApp::new(&[]);

        let (status, body) = app
            .post_json(
                "/events/bulk",
                json!([
                    event_json("b1", "2025-06-01", &[]),
                    event_json("b2", "2025-06-02", &[]),
                ]),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert_eq!(body["message"], "2 events added to processing queue");

        let mut bad = event_json("b4", "June 4th", &[]);
        bad["title"] = json!("   ");
        let (status, body) = app
            .post_json(
                "/events/bulk",
                json!([event_json("b3", "2025-06-03", &[]), bad]),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"][0]["index"], 1);
        assert_eq!(body["details"][0]["source_id"], "b4");
        assert_eq!(app.queue.len().await.unwrap(), 2);

        let (status, body) = app.post_json("/events/bulk", json!([])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);
    }

    #[tokio::test]
    async fn test_submitted_events_become_readable_after_ingestion() {
        let app = TestApp::new(&[]);
        app.post_json("/events", event_json("ev1", "2025-06-15", &[]))
            .await;
        let mut second = event_json("ev1", "2025-06-15", &[]);
        second["title"] = json!("B");
        second["price"] = json!(20);
        app.post_json("/events", second).await;

        app.drain().await;

        let (status, body) = app.get("/events").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pagination"]["total"], 1);
        assert_eq!(body["data"][0]["title"], "B");
        assert_eq!(body["data"][0]["price"], 20.0);
        assert_eq!(body["data"][0]["status"], "active");
    }

    #[tokio::test]
    async fn test_list_filters_and_pagination() {
        let app = TestApp::new(&[]);
        seed(&app, "a", "2025-06-01", &["jazz"]).await;
        seed(&app, "b", "2025-06-02", &["blues"]).await;
        seed(&app, "c", "2025-06-03", &["folk"]).await;
        seed(&app, "d", "2025-07-01", &["jazz"]).await;

        let (status, body) = app.get("/events?limit=3&skip=3").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(
            body["pagination"],
            json!({"skip": 3, "limit": 3, "total": 4, "pages": 2})
        );

        let (_, body) = app.get("/events?tags=jazz&tags%5B%5D=blues").await;
        assert_eq!(body["pagination"]["total"], 3);

        let (_, body) = app
            .get("/events?date_from=2025-06-02&date_to=2025-06-30&location=nashville")
            .await;
        let keys: Vec<_> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["source_id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(keys, vec!["b", "c"]);

        let (status, body) = app.get("/events?limit=many").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");

        let (status, _) = app
            .get("/events?date_from=2025-07-01&date_to=2025-06-01")
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_event_and_sources() {
        let app = TestApp::new(&[]);
        let id = seed(&app, "a", "2025-06-01", &[]).await;

        let (status, body) = app.get(&format!("/events/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], id.as_str());

        let (status, body) = app.get("/events/does-not-exist").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");

        let (_, body) = app.get("/sources").await;
        assert_eq!(body["data"], json!(["venue"]));
    }

    #[tokio::test]
    async fn test_cancel_requires_token_when_configured() {
        let app = TestApp::new(&["secret"]);
        let id = seed(&app, "a", "2025-06-01", &[]).await;
        let uri = format!("/events/{id}");

        let (status, _) = app
            .send(Request::delete(uri.as_str()).body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let wrong = Request::delete(uri.as_str())
            .header(header::AUTHORIZATION, "Bearer nope")
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.send(wrong).await.0, StatusCode::UNAUTHORIZED);

        let authorized = || {
            Request::delete(uri.as_str())
                .header(header::AUTHORIZATION, "Bearer secret")
                .body(Body::empty())
                .unwrap()
        };
        let (status, body) = app.send(authorized()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");

        let (status, _) = app.send(authorized()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // Reads stay public and still see the cancelled record by id.
        let (status, body) = app.get(&uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "cancelled");
        let (_, body) = app.get("/events").await;
        assert_eq!(body["pagination"]["total"], 0);
    }

    #[tokio::test]
    async fn test_admin_routes_open_without_tokens() {
        let app = TestApp::new(&[]);
        seed(&app, "a", "2025-06-01", &[]).await;
        app.queue.push("waiting".to_string()).await.unwrap();

        let (status, body) = app.get("/admin/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stats"]["total_events"], 1);
        assert_eq!(body["stats"]["active_events"], 1);
        assert_eq!(body["stats"]["sources_count"], 1);
        assert_eq!(body["stats"]["queue_depth"], 1);
        assert_eq!(body["stats"]["dead_letter_depth"], 0);
    }

    #[tokio::test]
    async fn test_replay_dead_letters() {
        let app = TestApp::new(&["secret"]);
        let event: NewEvent =
            serde_json::from_value(event_json("dl", "2025-06-01", &[])).unwrap();
        let mut item = QueueItem::new(event);
        item.attempts = 5;
        app.queue.dead_letter(item.encode().unwrap()).await.unwrap();

        let unauthenticated = Request::post("/admin/dead-letter/replay")
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.send(unauthenticated).await.0, StatusCode::UNAUTHORIZED);

        let request = Request::post("/admin/dead-letter/replay?max=10")
            .header(header::AUTHORIZATION, "Bearer secret")
            .body(Body::empty())
            .unwrap();
        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["replayed"], 1);
        assert_eq!(app.queue.dead_letter_len().await.unwrap(), 0);

        app.drain().await;
        let (_, body) = app.get("/events").await;
        assert_eq!(body["data"][0]["source_id"], "dl");
    }
}
