use async_trait::async_trait;
use google_cloud_googleapis::pubsub::v1::PubsubMessage;
use google_cloud_pubsub::client::{Client, ClientConfig};
use google_cloud_pubsub::publisher::Publisher;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

use super::PublishError;
use crate::model::Alert;

/// Outbound alert notifications, keyed by device id.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    async fn publish_alert(&self, alert: &Alert) -> Result<(), PublishError>;

    async fn close(&mut self) -> Result<(), PublishError> {
        Ok(())
    }
}

pub struct PubSubAlertChannel {
    publisher: Publisher,
    topic_name: String,
    timeout: Duration,
}

impl PubSubAlertChannel {
    /// Fails if the topic cannot be reached or does not exist.
    pub async fn connect(
        topic_name: &str,
        connect_timeout: Duration,
        op_timeout: Duration,
    ) -> Result<Self, PublishError> {
        let setup = async {
            let config = ClientConfig::default()
                .with_auth()
                .await
                .map_err(|e| PublishError::Connection(e.to_string()))?;
            let client = Client::new(config)
                .await
                .map_err(|e| PublishError::Connection(e.to_string()))?;

            let topic = client.topic(topic_name);
            let exists = topic
                .exists(None)
                .await
                .map_err(|e| PublishError::Connection(e.to_string()))?;
            if !exists {
                return Err(PublishError::Connection(format!(
                    "topic {} does not exist",
                    topic_name
                )));
            }
            Ok(topic.new_publisher(None))
        };

        let publisher = tokio::time::timeout(connect_timeout, setup)
            .await
            .map_err(|_| PublishError::Timeout(connect_timeout))??;

        info!("Connected to Pub/Sub topic {}", topic_name);
        Ok(Self {
            publisher,
            topic_name: topic_name.to_string(),
            timeout: op_timeout,
        })
    }
}

/// Orders alerts per device and lets subscribers filter without decoding the body.
pub fn alert_message(alert: &Alert) -> Result<PubsubMessage, PublishError> {
    let data = serde_json::to_vec(alert)?;
    let attributes = HashMap::from([
        ("device_id".to_string(), alert.device_id.clone()),
        ("alert_type".to_string(), alert.alert_type.as_str().to_string()),
        ("severity".to_string(), alert.severity.as_str().to_string()),
    ]);

    Ok(PubsubMessage {
        data,
        attributes,
        ordering_key: alert.device_id.clone(),
        ..Default::default()
    })
}

#[async_trait]
impl AlertChannel for PubSubAlertChannel {
    async fn publish_alert(&self, alert: &Alert) -> Result<(), PublishError> {
        let message = alert_message(alert)?;

        let send = async {
            let awaiter = self.publisher.publish(message).await;
            awaiter
                .get()
                .await
                .map_err(|e| PublishError::Publish(e.to_string()))
        };

        let message_id = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| PublishError::Timeout(self.timeout))??;

        info!(
            "Published {} alert for {} to {}: message_id={}",
            alert.alert_type, alert.device_id, self.topic_name, message_id
        );
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PublishError> {
        if tokio::time::timeout(self.timeout, self.publisher.shutdown())
            .await
            .is_err()
        {
            warn!("Pub/Sub publisher did not flush within {:?}", self.timeout);
        }
        info!("Pub/Sub publisher for {} shut down", self.topic_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Issue, IssueType};
    use chrono::Utc;

    #[test]
    fn message_is_keyed_by_device() {
        let issue = Issue::new(IssueType::WaterNeeded, "Soil moisture too low: 15% (needs 40%+)");
        let alert = Alert::from_issue("plant-001", &issue, Utc::now());

        let message = alert_message(&alert).unwrap();
        assert_eq!(message.ordering_key, "plant-001");
        assert_eq!(message.attributes["device_id"], "plant-001");
        assert_eq!(message.attributes["severity"], "HIGH");

        let body: serde_json::Value = serde_json::from_slice(&message.data).unwrap();
        assert_eq!(body["type"], "WATER_NEEDED");
        assert_eq!(body["message"], issue.message);
    }
}
