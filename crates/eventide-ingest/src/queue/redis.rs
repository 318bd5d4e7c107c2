//! Redis list queue backend.
//!
//! The main queue and the dead-letter list are two plain Redis lists:
//! producers RPUSH onto the tail and the worker BLPOPs from the head.
//!
//! Connections are opened lazily and discarded after any command error, so
//! a Redis outage surfaces as per-call errors and the next call reconnects.
//! Blocking pops get their own connection so a parked BLPOP never delays
//! pushes and length queries issued from the same process.

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Script};
use std::time::Duration;
use tracing::{debug, warn};

use super::{replay_form, EventQueue};
use crate::{Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Move dead letters back to the main queue.
///
/// `KEYS[1]` -> dead-letter list
/// `KEYS[2]` -> main queue
/// `ARGV` -> pairs of (dead payload, replacement); an empty replacement
/// rotates the payload to the tail of the dead-letter list instead.
///
/// A pair whose payload is no longer in the dead-letter list is skipped.
const REPLAY_SCRIPT: &str = r#"
local moved = 0
for i = 1, #ARGV, 2 do
    if redis.call("LREM", KEYS[1], 1, ARGV[i]) == 1 then
        if ARGV[i + 1] == "" then
            redis.call("RPUSH", KEYS[1], ARGV[i])
        else
            redis.call("RPUSH", KEYS[2], ARGV[i + 1])
            moved = moved + 1
        end
    end
end
return moved
"#;

/// Redis queue settings.
#[derive(Debug, Clone)]
pub struct RedisQueueConfig {
    /// Connection URL, e.g. `redis://127.0.0.1:6379/0`.
    pub url: String,
    /// List holding pending payloads.
    pub queue_key: String,
    /// List holding payloads that exhausted their attempts.
    pub dead_letter_key: String,
}

impl Default for RedisQueueConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            queue_key: "events_queue".to_string(),
            dead_letter_key: "events_queue:dead".to_string(),
        }
    }
}

/// Queue stored in Redis lists.
pub struct RedisQueue {
    client: Client,
    config: RedisQueueConfig,
    commands: Mutex<Option<MultiplexedConnection>>,
    blocking: Mutex<Option<MultiplexedConnection>>,
    replay_script: Script,
}

impl RedisQueue {
    /// Create a queue handle.
    ///
    /// Only the URL is checked here; no connection is made until first use,
    /// so a process can start while Redis is down.
    pub fn new(config: RedisQueueConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;
        Ok(Self {
            client,
            config,
            commands: Mutex::new(None),
            blocking: Mutex::new(None),
            replay_script: Script::new(REPLAY_SCRIPT),
        })
    }

    pub fn config(&self) -> &RedisQueueConfig {
        &self.config
    }

    async fn connection(
        &self,
        slot: &Mutex<Option<MultiplexedConnection>>,
    ) -> Result<MultiplexedConnection> {
        let cached = slot.lock().clone();
        if let Some(conn) = cached {
            return Ok(conn);
        }

        let conn = tokio::time::timeout(
            CONNECT_TIMEOUT,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| Error::Unavailable("timed out connecting to Redis".to_string()))??;

        debug!(key = %self.config.queue_key, "connected to Redis");
        *slot.lock() = Some(conn.clone());
        Ok(conn)
    }

    /// Drop the cached connection after a failed command.
    fn invalidate<T>(
        &self,
        slot: &Mutex<Option<MultiplexedConnection>>,
        result: redis::RedisResult<T>,
    ) -> Result<T> {
        result.map_err(|e| {
            warn!(error = %e, "Redis command failed, dropping connection");
            slot.lock().take();
            Error::Redis(e)
        })
    }

    async fn rpush(&self, key: &str, payload: String) -> Result<()> {
        let mut conn = self.connection(&self.commands).await?;
        let result: redis::RedisResult<()> = conn.rpush(key, payload).await;
        self.invalidate(&self.commands, result)
    }

    async fn llen(&self, key: &str) -> Result<u64> {
        let mut conn = self.connection(&self.commands).await?;
        let result: redis::RedisResult<u64> = conn.llen(key).await;
        self.invalidate(&self.commands, result)
    }
}

#[async_trait]
impl EventQueue for RedisQueue {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn push(&self, payload: String) -> Result<()> {
        self.rpush(&self.config.queue_key, payload).await
    }

    async fn push_bulk(&self, payloads: Vec<String>) -> Result<()> {
        if payloads.is_empty() {
            return Ok(());
        }

        let mut conn = self.connection(&self.commands).await?;
        let result: redis::RedisResult<()> = redis::pipe()
            .atomic()
            .rpush(&self.config.queue_key, payloads)
            .ignore()
            .query_async(&mut conn)
            .await;
        self.invalidate(&self.commands, result)
    }

    async fn pop_blocking(&self, timeout: Duration) -> Result<Option<String>> {
        let mut conn = self.connection(&self.blocking).await?;
        // BLPOP treats 0 as "wait forever".
        let seconds = timeout.as_secs_f64().max(0.01);
        let result: redis::RedisResult<Option<(String, String)>> =
            conn.blpop(&self.config.queue_key, seconds).await;
        let popped = self.invalidate(&self.blocking, result)?;
        Ok(popped.map(|(_key, payload)| payload))
    }

    async fn requeue(&self, payload: String) -> Result<()> {
        self.rpush(&self.config.queue_key, payload).await
    }

    async fn dead_letter(&self, payload: String) -> Result<()> {
        self.rpush(&self.config.dead_letter_key, payload).await
    }

    async fn replay_dead_letters(&self, max: usize) -> Result<usize> {
        if max == 0 {
            return Ok(0);
        }

        let mut conn = self.connection(&self.commands).await?;
        let stop = isize::try_from(max).unwrap_or(isize::MAX) - 1;
        let result: redis::RedisResult<Vec<String>> =
            conn.lrange(&self.config.dead_letter_key, 0, stop).await;
        let head = self.invalidate(&self.commands, result)?;
        if head.is_empty() {
            return Ok(0);
        }

        // Nothing is removed until the script runs, and the script removes
        // each original only together with queueing its replacement.
        let mut invocation = self.replay_script.key(&self.config.dead_letter_key);
        invocation.key(&self.config.queue_key);
        for payload in &head {
            let fresh = replay_form(payload).unwrap_or_default();
            invocation.arg(payload).arg(fresh);
        }
        let result: redis::RedisResult<usize> = invocation.invoke_async(&mut conn).await;
        self.invalidate(&self.commands, result)
    }

    async fn len(&self) -> Result<u64> {
        self.llen(&self.config.queue_key).await
    }

    async fn dead_letter_len(&self) -> Result<u64> {
        self.llen(&self.config.dead_letter_key).await
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection(&self.commands).await?;
        let result: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        self.invalidate(&self.commands, result).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueItem;
    use eventide_core::NewEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    /// Minimal RESP server: answers PING with PONG and everything else with
    /// OK. The connection that receives the `drop_on_ping`-th PING (zero
    /// based) is closed without a reply.
    async fn fake_redis(drop_on_ping: usize) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("redis://{}", listener.local_addr().unwrap());
        let connections = Arc::new(AtomicUsize::new(0));
        let pings = Arc::new(AtomicUsize::new(0));

        let accepted = Arc::clone(&connections);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                let pings = Arc::clone(&pings);
                tokio::spawn(async move {
                    let (read, mut write) = socket.into_split();
                    let mut lines = BufReader::new(read).lines();
                    while let Ok(Some(header)) = lines.next_line().await {
                        let Some(count) = header
                            .strip_prefix('*')
                            .and_then(|n| n.parse::<usize>().ok())
                        else {
                            return;
                        };
                        let mut args = Vec::with_capacity(count);
                        for _ in 0..count {
                            // `$<len>` then the argument itself.
                            let (Ok(Some(_)), Ok(Some(arg))) =
                                (lines.next_line().await, lines.next_line().await)
                            else {
                                return;
                            };
                            args.push(arg);
                        }

                        let is_ping = args.first().is_some_and(|c| c.eq_ignore_ascii_case("PING"));
                        let reply = if is_ping {
                            if pings.fetch_add(1, Ordering::SeqCst) == drop_on_ping {
                                return;
                            }
                            "+PONG\r\n"
                        } else {
                            "+OK\r\n"
                        };
                        if write.write_all(reply.as_bytes()).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });

        (url, connections)
    }

    fn test_config(suffix: &str) -> RedisQueueConfig {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        RedisQueueConfig {
            url,
            queue_key: format!("eventide_test:{suffix}"),
            dead_letter_key: format!("eventide_test:{suffix}:dead"),
        }
    }

    #[test]
    fn test_new_rejects_bad_url() {
        let config = RedisQueueConfig {
            url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(RedisQueue::new(config).is_err());
    }

    #[test]
    fn test_new_does_not_connect() {
        let config = RedisQueueConfig {
            url: "redis://127.0.0.1:1".to_string(),
            ..Default::default()
        };
        let queue = RedisQueue::new(config).unwrap();
        assert_eq!(queue.name(), "redis");
    }

    #[tokio::test]
    async fn test_unreachable_redis_is_transient() {
        let config = RedisQueueConfig {
            url: "redis://127.0.0.1:1".to_string(),
            ..Default::default()
        };
        let queue = RedisQueue::new(config).unwrap();
        let err = queue.push("x".to_string()).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_reconnects_after_dropped_connection() {
        let (url, connections) = fake_redis(1).await;
        let queue = RedisQueue::new(RedisQueueConfig {
            url,
            ..Default::default()
        })
        .unwrap();
        let wait = Duration::from_secs(5);

        tokio::time::timeout(wait, queue.ping()).await.unwrap().unwrap();
        assert_eq!(connections.load(Ordering::SeqCst), 1);

        // The server hangs up mid-command; the cached connection is discarded.
        let err = tokio::time::timeout(wait, queue.ping())
            .await
            .unwrap()
            .unwrap_err();
        assert!(err.is_transient());
        assert!(queue.commands.lock().is_none());

        tokio::time::timeout(wait, queue.ping()).await.unwrap().unwrap();
        assert_eq!(connections.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_replay_against_unreachable_redis_fails_cleanly() {
        let config = RedisQueueConfig {
            url: "redis://127.0.0.1:1".to_string(),
            ..Default::default()
        };
        let queue = RedisQueue::new(config).unwrap();
        assert!(queue.replay_dead_letters(0).await.is_ok());
        let err = queue.replay_dead_letters(10).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn test_round_trip_against_redis() {
        let queue = RedisQueue::new(test_config("round_trip")).unwrap();
        let _: redis::RedisResult<()> = {
            let mut conn = queue.connection(&queue.commands).await.unwrap();
            conn.del(&queue.config.dead_letter_key).await
        };
        while queue.pop_blocking(Duration::from_millis(10)).await.unwrap().is_some() {}

        queue
            .push_bulk(vec!["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(queue.len().await.unwrap(), 2);

        let head = queue.pop_blocking(Duration::from_secs(1)).await.unwrap();
        assert_eq!(head.as_deref(), Some("a"));

        while queue.pop_blocking(Duration::from_millis(10)).await.unwrap().is_some() {}

        let mut item = QueueItem::new(NewEvent {
            source_id: "r1".to_string(),
            title: "Gig".to_string(),
            description: "Live".to_string(),
            location: "Hall".to_string(),
            date: "2025-06-15".to_string(),
            source: "venue".to_string(),
            source_url: "https://venue.example.com/r1".to_string(),
            ..Default::default()
        });
        item.attempts = 5;
        queue.dead_letter("{bad".to_string()).await.unwrap();
        queue.dead_letter(item.encode().unwrap()).await.unwrap();
        assert_eq!(queue.dead_letter_len().await.unwrap(), 2);

        assert_eq!(queue.replay_dead_letters(5).await.unwrap(), 1);
        assert_eq!(queue.dead_letter_len().await.unwrap(), 1);
        let replayed = queue.pop_blocking(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(QueueItem::decode(&replayed).unwrap().attempts, 0);
    }
}
