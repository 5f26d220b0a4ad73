//! Inbound reading channel.

pub mod redis_stream;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use redis_stream::RedisStreamSource;

/// One raw message pulled from the inbound channel.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Transport id, used to acknowledge.
    pub id: String,
    /// Partition key (device id) when the producer set one. Not used by the pipeline.
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("acknowledge error: {0}")]
    Ack(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl SourceError {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Connection(_) => "connection",
            SourceError::Read(_) => "read",
            SourceError::Ack(_) => "ack",
            SourceError::Timeout(_) => "timeout",
        }
    }
}

/// A pull-based consumer with explicit lifecycle.
///
/// Messages are delivered at least once: anything not acknowledged is handed
/// out again after a reconnect.
#[async_trait]
pub trait ReadingSource: Send {
    async fn connect(&mut self) -> Result<(), SourceError>;

    /// Waits up to the source's poll interval; `Ok(None)` when nothing arrived.
    async fn next_message(&mut self) -> Result<Option<InboundMessage>, SourceError>;

    async fn ack(&mut self, message_id: &str) -> Result<(), SourceError>;

    async fn close(&mut self) -> Result<(), SourceError>;
}
