//! SQLite-backed event store.
//!
//! One connection serves every caller, guarded by a mutex and driven from
//! `spawn_blocking` so SQLite I/O never runs on an async worker thread.
//! File-backed stores open that connection lazily and discard it after a
//! connection-level failure; the next call reopens it. A store whose file is
//! unreachable at startup therefore reports errors until the file becomes
//! available, without a restart.

use chrono::{DateTime, Utc};
use eventide_core::{EventFilter, EventRecord, EventStatus, NewEvent, PageRequest};
use parking_lot::Mutex;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use super::schema::init_schema;
use super::{EventStore, StoreStats, UpsertOutcome};
use crate::{Error, Result};

const SELECT_COLUMNS: &str = "id, source_id, title, description, location, date, time, source, \
     source_url, price, image_url, tags, status, created_at, updated_at";

const UPSERT_SQL: &str = r#"
    INSERT INTO events (
        id, source_id, title, description, location, date, time, source,
        source_url, price, image_url, tags, status, created_at, updated_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 'active', ?13, ?13)
    ON CONFLICT(source_id) DO UPDATE SET
        title = excluded.title,
        description = excluded.description,
        location = excluded.location,
        date = excluded.date,
        time = excluded.time,
        source = excluded.source,
        source_url = excluded.source_url,
        price = excluded.price,
        image_url = excluded.image_url,
        tags = excluded.tags,
        status = CASE
            WHEN events.status IN ('cancelled', 'completed') THEN events.status
            ELSE 'active'
        END,
        updated_at = excluded.updated_at
    RETURNING id, status
"#;

/// Event store in a single SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    /// `None` for in-memory databases, which cannot be reopened.
    path: Option<PathBuf>,
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteStore {
    /// Create a store for the database at `path`.
    ///
    /// The database is opened on first use, so this never fails.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            conn: Arc::new(Mutex::new(None)),
        }
    }

    /// Open a private in-memory database (tests, demos).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            path: None,
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let slot = Arc::clone(&self.conn);
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || {
            let mut guard = slot.lock();
            let conn = match guard.take() {
                Some(conn) => conn,
                None => match &path {
                    Some(path) => open_file(path)?,
                    None => {
                        return Err(Error::Unavailable(
                            "in-memory store has no connection".to_string(),
                        ))
                    }
                },
            };

            let result = f(&conn);
            match &result {
                Err(Error::Sqlite(e)) if path.is_some() && is_connection_error(e) => {
                    warn!(error = %e, "dropping SQLite connection after failure");
                }
                _ => *guard = Some(conn),
            }
            result
        })
        .await?
    }
}

fn open_file(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
    init_schema(&conn)?;

    info!(path = %path.display(), "opened event store");
    Ok(conn)
}

/// Errors after which the connection itself is suspect.
fn is_connection_error(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(err, _) => matches!(
            err.code,
            ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::SystemIoFailure
                | ErrorCode::PermissionDenied
                | ErrorCode::ReadOnly
        ),
        _ => false,
    }
}

/// Build the WHERE clause for `filter`, always restricted to active events.
fn where_clause(filter: &EventFilter) -> (String, Vec<Value>) {
    let mut conditions = vec!["status = 'active'".to_string()];
    let mut params: Vec<Value> = Vec::new();

    if let Some(from) = &filter.date_from {
        conditions.push("date >= ?".to_string());
        params.push(Value::Text(from.clone()));
    }
    if let Some(to) = &filter.date_to {
        conditions.push("date <= ?".to_string());
        params.push(Value::Text(to.clone()));
    }
    if let Some(location) = &filter.location {
        conditions.push("instr(lower(location), lower(?)) > 0".to_string());
        params.push(Value::Text(location.clone()));
    }
    if let Some(source) = &filter.source {
        conditions.push("source = ?".to_string());
        params.push(Value::Text(source.clone()));
    }
    if !filter.tags.is_empty() {
        let placeholders = vec!["?"; filter.tags.len()].join(", ");
        conditions.push(format!(
            "EXISTS (SELECT 1 FROM json_each(events.tags) WHERE json_each.value IN ({placeholders}))"
        ));
        params.extend(filter.tags.iter().cloned().map(Value::Text));
    }
    if let Some(min) = filter.price_min {
        conditions.push("price >= ?".to_string());
        params.push(Value::Real(min));
    }
    if let Some(max) = filter.price_max {
        conditions.push("price <= ?".to_string());
        params.push(Value::Real(max));
    }

    (conditions.join(" AND "), params)
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<EventRecord> {
    let tags_json: String = row.get(11)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(11, Type::Text, Box::new(e)))?;

    let status_text: String = row.get(12)?;
    let status = parse_status(12, &status_text)?;

    Ok(EventRecord {
        id: row.get(0)?,
        source_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        location: row.get(4)?,
        date: row.get(5)?,
        time: row.get(6)?,
        source: row.get(7)?,
        source_url: row.get(8)?,
        price: row.get(9)?,
        image_url: row.get(10)?,
        tags,
        status,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn parse_status(idx: usize, text: &str) -> rusqlite::Result<EventStatus> {
    text.parse().map_err(|()| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown event status '{text}'").into(),
        )
    })
}

#[async_trait::async_trait]
impl EventStore for SqliteStore {
    async fn upsert(&self, event: &NewEvent, now: DateTime<Utc>) -> Result<UpsertOutcome> {
        let event = event.clone();
        let tags = serde_json::to_string(&event.tags)?;
        let new_id = Uuid::new_v4().to_string();

        self.with_conn(move |conn| {
            let (id, status_text): (String, String) = conn.query_row(
                UPSERT_SQL,
                params![
                    new_id,
                    event.source_id,
                    event.title,
                    event.description,
                    event.location,
                    event.date,
                    event.time,
                    event.source,
                    event.source_url,
                    event.price,
                    event.image_url,
                    tags,
                    now,
                ],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let status = parse_status(1, &status_text)?;

            Ok(UpsertOutcome {
                inserted: id == new_id,
                id,
                status,
            })
        })
        .await
    }

    async fn list(&self, filter: &EventFilter, page: PageRequest) -> Result<Vec<EventRecord>> {
        let (clause, mut params) = where_clause(filter);
        params.push(Value::Integer(i64::from(page.limit)));
        params.push(Value::Integer(i64::try_from(page.skip).unwrap_or(i64::MAX)));

        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {SELECT_COLUMNS} FROM events WHERE {clause} \
                 ORDER BY date ASC, source_id ASC LIMIT ? OFFSET ?"
            );
            let mut stmt = conn.prepare(&sql)?;
            let records = stmt
                .query_map(params_from_iter(params), row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }

    async fn count(&self, filter: &EventFilter) -> Result<u64> {
        let (clause, params) = where_clause(filter);

        self.with_conn(move |conn| {
            let sql = format!("SELECT COUNT(*) FROM events WHERE {clause}");
            let total: i64 = conn.query_row(&sql, params_from_iter(params), |row| row.get(0))?;
            Ok(total.max(0) as u64)
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<EventRecord>> {
        let id = id.to_string();

        self.with_conn(move |conn| {
            let sql = format!("SELECT {SELECT_COLUMNS} FROM events WHERE id = ?1");
            Ok(conn.query_row(&sql, [id], row_to_record).optional()?)
        })
        .await
    }

    async fn distinct_sources(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT source FROM events ORDER BY source")?;
            let sources = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(sources)
        })
        .await
    }

    async fn cancel(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let id = id.to_string();

        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE events SET status = 'cancelled', updated_at = ?1
                 WHERE id = ?2 AND status != 'cancelled'",
                params![now, id],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.with_conn(|conn| {
            let (total, active, cancelled): (i64, i64, i64) = conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(status = 'active'), 0),
                        COALESCE(SUM(status = 'cancelled'), 0)
                 FROM events",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

            let mut stmt = conn.prepare("SELECT DISTINCT source FROM events ORDER BY source")?;
            let sources = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;

            Ok(StoreStats {
                total: total.max(0) as u64,
                active: active.max(0) as u64,
                cancelled: cancelled.max(0) as u64,
                sources,
            })
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }
}
