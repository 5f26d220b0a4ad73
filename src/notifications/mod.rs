pub mod home_assistant;
pub mod pubsub_client;

use std::time::Duration;
use thiserror::Error;

pub use home_assistant::{MqttSettings, MqttStatePublisher, StatePublisher};
pub use pubsub_client::{AlertChannel, PubSubAlertChannel};

/// Failure on a best-effort outbound channel. Never fatal mid-stream.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}
