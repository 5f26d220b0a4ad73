use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamId, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::time::Duration;

use super::{InboundMessage, ReadingSource, SourceError};

/// Stream entry field carrying the JSON reading.
pub const VALUE_FIELD: &str = "value";
/// Optional stream entry field carrying the device id.
pub const KEY_FIELD: &str = "key";

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub redis_url: String,
    pub stream: String,
    pub group: String,
    pub consumer: String,
    pub block: Duration,
    pub connect_timeout: Duration,
    /// Pending entries of other consumers idle for at least this long are
    /// taken over on connect.
    pub claim_min_idle: Duration,
}

/// Entries claimed per `XAUTOCLAIM` call.
const CLAIM_BATCH: usize = 100;

/// Consumer-group reader over a Redis Stream.
///
/// After every (re)connect the consumer claims entries left pending by
/// consumers that went away (a crashed container restarts under a new
/// hostname), then drains its own pending entries, then switches to new
/// entries.
pub struct RedisStreamSource {
    client: redis::Client,
    settings: StreamSettings,
    conn: Option<MultiplexedConnection>,
    replaying_pending: bool,
}

impl RedisStreamSource {
    pub fn new(settings: StreamSettings) -> Result<Self, SourceError> {
        let client = redis::Client::open(settings.redis_url.as_str())
            .map_err(|e| SourceError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            settings,
            conn: None,
            replaying_pending: true,
        })
    }

    fn cursor(&self) -> &'static str {
        if self.replaying_pending {
            "0"
        } else {
            ">"
        }
    }
}

#[async_trait]
impl ReadingSource for RedisStreamSource {
    async fn connect(&mut self) -> Result<(), SourceError> {
        let timeout = self.settings.connect_timeout;
        let mut conn = tokio::time::timeout(timeout, self.client.get_multiplexed_async_connection())
            .await
            .map_err(|_| SourceError::Timeout(timeout))?
            .map_err(|e| SourceError::Connection(e.to_string()))?;

        let created: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(&self.settings.stream, &self.settings.group, "0")
            .await;
        match created {
            Ok(()) => tracing::info!(
                "Created consumer group {} on {}",
                self.settings.group,
                self.settings.stream
            ),
            Err(e) if e.code() == Some("BUSYGROUP") => {}
            Err(e) => return Err(SourceError::Connection(e.to_string())),
        }

        let claimed = claim_stale(&mut conn, &self.settings).await?;
        if claimed > 0 {
            tracing::info!("Claimed {} stale pending entries", claimed);
        }

        tracing::info!(
            "Consuming {} as {}/{}",
            self.settings.stream,
            self.settings.group,
            self.settings.consumer
        );
        self.conn = Some(conn);
        self.replaying_pending = true;
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<InboundMessage>, SourceError> {
        let cursor = self.cursor();
        let mut options = StreamReadOptions::default()
            .group(&self.settings.group, &self.settings.consumer)
            .count(1);
        if !self.replaying_pending {
            options = options.block(self.settings.block.as_millis() as usize);
        }

        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| SourceError::Connection("not connected".to_string()))?;

        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&self.settings.stream], &[cursor], &options)
            .await
            .map_err(|e| SourceError::Read(e.to_string()))?;

        let entry = reply
            .and_then(|r| r.keys.into_iter().next())
            .and_then(|k| k.ids.into_iter().next());

        match entry {
            Some(entry) => Ok(Some(to_message(entry))),
            None => {
                if self.replaying_pending {
                    tracing::debug!("Pending entries drained, reading new entries");
                    self.replaying_pending = false;
                }
                Ok(None)
            }
        }
    }

    async fn ack(&mut self, message_id: &str) -> Result<(), SourceError> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| SourceError::Connection("not connected".to_string()))?;
        let _: i64 = conn
            .xack(&self.settings.stream, &self.settings.group, &[message_id])
            .await
            .map_err(|e| SourceError::Ack(e.to_string()))?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        if self.conn.take().is_some() {
            tracing::info!("Closed Redis stream consumer {}", self.settings.consumer);
        }
        Ok(())
    }
}

/// Moves every entry idle longer than `claim_min_idle` into this consumer's
/// pending list, where the `0` replay picks it up.
async fn claim_stale(
    conn: &mut MultiplexedConnection,
    settings: &StreamSettings,
) -> Result<usize, SourceError> {
    let mut cursor = "0-0".to_string();
    let mut claimed = 0;
    loop {
        let reply: Vec<redis::Value> = redis::cmd("XAUTOCLAIM")
            .arg(&settings.stream)
            .arg(&settings.group)
            .arg(&settings.consumer)
            .arg(settings.claim_min_idle.as_millis() as u64)
            .arg(&cursor)
            .arg("COUNT")
            .arg(CLAIM_BATCH)
            .arg("JUSTID")
            .query_async(conn)
            .await
            .map_err(|e| SourceError::Connection(e.to_string()))?;

        let (next, ids) = parse_autoclaim(reply)?;
        claimed += ids.len();
        if next == "0-0" {
            return Ok(claimed);
        }
        cursor = next;
    }
}

/// `XAUTOCLAIM ... JUSTID` replies `[next-cursor, [id, ...]]`, plus a list of
/// deleted ids on Redis 7.
fn parse_autoclaim(reply: Vec<redis::Value>) -> Result<(String, Vec<String>), SourceError> {
    let invalid = |detail: &str| SourceError::Read(format!("unexpected XAUTOCLAIM reply: {}", detail));
    let mut parts = reply.into_iter();

    let cursor = parts.next().ok_or_else(|| invalid("empty"))?;
    let cursor: String =
        redis::from_redis_value(&cursor).map_err(|e| invalid(&e.to_string()))?;
    let ids = match parts.next() {
        Some(ids) => redis::from_redis_value(&ids).map_err(|e| invalid(&e.to_string()))?,
        None => Vec::new(),
    };
    Ok((cursor, ids))
}

/// Entries whose fields were trimmed away come back with an empty map; they
/// surface as empty payloads and are dropped as malformed.
fn to_message(entry: StreamId) -> InboundMessage {
    let key: Option<String> = entry.get(KEY_FIELD);
    let payload: Option<String> = entry.get(VALUE_FIELD);
    InboundMessage {
        id: entry.id,
        key,
        payload: payload.map(String::into_bytes).unwrap_or_default(),
    }
}
