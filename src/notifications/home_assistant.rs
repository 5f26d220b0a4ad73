//! Home Assistant facing status channel over MQTT.
//!
//! State goes to `homeassistant/sensor/<slug>/state` and discovery configs to
//! `homeassistant/sensor/<slug>_<metric>/config`, both retained so late
//! subscribers see the latest value.

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::PublishError;
use crate::metrics;
use crate::model::CondensedStatus;

pub const TOPIC_PREFIX: &str = "homeassistant/sensor";
pub const MANUFACTURER: &str = "Plant Care Pipeline";
pub const MODEL: &str = "Smart Plant Monitor";

/// Condensed status and discovery sink.
#[async_trait]
pub trait StatePublisher: Send + Sync {
    async fn publish_status(
        &self,
        device_id: &str,
        status: &CondensedStatus,
    ) -> Result<(), PublishError>;

    /// Registers every metric of every device with the automation UI.
    async fn announce(&self, device_ids: &[String]) -> Result<(), PublishError>;

    /// Increments whenever the broker session is (re)established; the
    /// ingestion loop re-announces when it changes.
    fn session(&self) -> u64;

    async fn close(&mut self) -> Result<(), PublishError> {
        Ok(())
    }
}

/// One entity exposed per device.
#[derive(Debug, Clone, Copy)]
pub struct SensorSpec {
    pub key: &'static str,
    pub name: &'static str,
    pub unit: Option<&'static str>,
    pub device_class: Option<&'static str>,
    pub icon: &'static str,
}

pub const SENSORS: [SensorSpec; 7] = [
    SensorSpec { key: "moisture", name: "Moisture", unit: Some("%"), device_class: Some("humidity"), icon: "mdi:water-percent" },
    SensorSpec { key: "health", name: "Health Score", unit: Some("pts"), device_class: None, icon: "mdi:leaf" },
    SensorSpec { key: "light", name: "Light Level", unit: Some("lux"), device_class: Some("illuminance"), icon: "mdi:lightbulb" },
    SensorSpec { key: "temperature", name: "Temperature", unit: Some("°C"), device_class: Some("temperature"), icon: "mdi:thermometer" },
    SensorSpec { key: "humidity", name: "Humidity", unit: Some("%"), device_class: Some("humidity"), icon: "mdi:water-percent" },
    SensorSpec { key: "status", name: "Status", unit: None, device_class: None, icon: "mdi:sprout" },
    SensorSpec { key: "battery", name: "Battery", unit: Some("%"), device_class: Some("battery"), icon: "mdi:battery" },
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryDevice {
    pub identifiers: Vec<String>,
    pub name: String,
    pub manufacturer: &'static str,
    pub model: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryConfig {
    pub name: String,
    pub state_topic: String,
    pub value_template: String,
    pub unique_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<&'static str>,
    pub icon: &'static str,
    pub device: DiscoveryDevice,
}

/// `plant-001` → `plant_001`
pub fn device_slug(device_id: &str) -> String {
    device_id.replace('-', "_")
}

/// `plant-001` → `Plant 001`; other ids are shown unchanged.
pub fn display_name(device_id: &str) -> String {
    match device_id.strip_prefix("plant-") {
        Some(rest) => format!("Plant {}", rest),
        None => device_id.to_string(),
    }
}

pub fn state_topic(device_id: &str) -> String {
    format!("{}/{}/state", TOPIC_PREFIX, device_slug(device_id))
}

pub fn discovery_messages(device_id: &str) -> Vec<(String, DiscoveryConfig)> {
    let slug = device_slug(device_id);
    let display = display_name(device_id);

    SENSORS
        .iter()
        .map(|sensor| {
            let unique_id = format!("{}_{}", slug, sensor.key);
            let config = DiscoveryConfig {
                name: format!("{} {}", display, sensor.name),
                state_topic: state_topic(device_id),
                value_template: format!("{{{{ value_json.{} }}}}", sensor.key),
                unique_id: unique_id.clone(),
                unit_of_measurement: sensor.unit,
                device_class: sensor.device_class,
                icon: sensor.icon,
                device: DiscoveryDevice {
                    identifiers: vec![slug.clone()],
                    name: display.clone(),
                    manufacturer: MANUFACTURER,
                    model: MODEL,
                },
            };
            (format!("{}/{}/config", TOPIC_PREFIX, unique_id), config)
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
}

/// Retained-message publisher backed by a rumqttc client.
///
/// `AsyncClient::publish` only queues the packet for the event loop, so a
/// successful call does not mean the broker has it. Publishing is refused
/// outright while the driver reports the broker connection as down.
pub struct MqttStatePublisher {
    client: AsyncClient,
    sessions: Arc<AtomicU64>,
    connected: Arc<AtomicBool>,
    driver: Option<JoinHandle<()>>,
    timeout: Duration,
}

impl MqttStatePublisher {
    /// Waits for the broker's CONNACK before returning, then hands the event
    /// loop to a background driver that keeps the session alive.
    pub async fn connect(
        settings: &MqttSettings,
        connect_timeout: Duration,
        op_timeout: Duration,
    ) -> Result<Self, PublishError> {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(settings.keep_alive);
        let (client, mut eventloop) = AsyncClient::new(options, 64);

        tokio::time::timeout(connect_timeout, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| PublishError::Timeout(connect_timeout))??;
        info!("Connected to MQTT broker {}:{}", settings.host, settings.port);

        let mut publisher = Self::from_client(client, op_timeout);
        publisher.connected.store(true, Ordering::SeqCst);
        publisher.driver = Some(tokio::spawn(drive(
            eventloop,
            publisher.sessions.clone(),
            publisher.connected.clone(),
        )));
        Ok(publisher)
    }

    /// Wraps a client whose event loop is driven elsewhere. Starts out
    /// disconnected.
    fn from_client(client: AsyncClient, op_timeout: Duration) -> Self {
        Self {
            client,
            sessions: Arc::new(AtomicU64::new(1)),
            connected: Arc::new(AtomicBool::new(false)),
            driver: None,
            timeout: op_timeout,
        }
    }

    async fn publish_retained(&self, topic: String, payload: Vec<u8>) -> Result<(), PublishError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(PublishError::Connection("MQTT broker unreachable".into()));
        }
        tokio::time::timeout(
            self.timeout,
            self.client.publish(topic, QoS::AtLeastOnce, true, payload),
        )
        .await
        .map_err(|_| PublishError::Timeout(self.timeout))?
        .map_err(|e| PublishError::Publish(e.to_string()))
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), PublishError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
            Ok(_) => {}
            Err(e) => return Err(PublishError::Connection(e.to_string())),
        }
    }
}

/// Network driver. rumqttc reconnects on the next poll after an error, so a
/// failed poll only pauses briefly. `connected` follows the last CONNACK or
/// poll error.
async fn drive(mut eventloop: EventLoop, sessions: Arc<AtomicU64>, connected: Arc<AtomicBool>) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                connected.store(true, Ordering::SeqCst);
                let session = sessions.fetch_add(1, Ordering::SeqCst) + 1;
                info!("MQTT session re-established (session {})", session);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                connected.store(false, Ordering::SeqCst);
                debug!("MQTT driver stopping");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if connected.swap(false, Ordering::SeqCst) {
                    warn!("MQTT connection lost: {}", e);
                } else {
                    debug!("MQTT still unreachable: {}", e);
                }
                metrics::increment_connection_errors("mqtt", "poll");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

#[async_trait]
impl StatePublisher for MqttStatePublisher {
    async fn publish_status(
        &self,
        device_id: &str,
        status: &CondensedStatus,
    ) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(status)?;
        self.publish_retained(state_topic(device_id), payload).await?;
        debug!("Updated Home Assistant state for {}", device_id);
        Ok(())
    }

    async fn announce(&self, device_ids: &[String]) -> Result<(), PublishError> {
        for device_id in device_ids {
            for (topic, config) in discovery_messages(device_id) {
                self.publish_retained(topic, serde_json::to_vec(&config)?)
                    .await?;
            }
        }
        info!("Published discovery for {} devices", device_ids.len());
        Ok(())
    }

    fn session(&self) -> u64 {
        self.sessions.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> Result<(), PublishError> {
        if let Err(e) = self.client.disconnect().await {
            warn!("MQTT disconnect failed: {}", e);
        }
        if let Some(mut driver) = self.driver.take() {
            if tokio::time::timeout(self.timeout, &mut driver).await.is_err() {
                driver.abort();
            }
        }
        info!("MQTT publisher closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_use_slugged_device_id() {
        assert_eq!(state_topic("plant-001"), "homeassistant/sensor/plant_001/state");
        assert_eq!(display_name("plant-001"), "Plant 001");
        assert_eq!(display_name("ficus"), "ficus");
    }

    #[test]
    fn one_discovery_message_per_metric() {
        let messages = discovery_messages("plant-002");
        assert_eq!(messages.len(), SENSORS.len());

        let (topic, config) = &messages[0];
        assert_eq!(topic, "homeassistant/sensor/plant_002_moisture/config");
        assert_eq!(config.name, "Plant 002 Moisture");
        assert_eq!(config.state_topic, "homeassistant/sensor/plant_002/state");
        assert_eq!(config.value_template, "{{ value_json.moisture }}");
        assert_eq!(config.device.identifiers, vec!["plant_002".to_string()]);
    }

    #[test]
    fn discovery_omits_absent_unit_and_class() {
        let messages = discovery_messages("plant-001");
        let (_, status) = messages
            .iter()
            .find(|(topic, _)| topic.ends_with("_status/config"))
            .unwrap();

        let json = serde_json::to_value(status).unwrap();
        assert!(json.get("unit_of_measurement").is_none());
        assert!(json.get("device_class").is_none());
        assert_eq!(json["icon"], "mdi:sprout");
        assert_eq!(json["device"]["manufacturer"], MANUFACTURER);
    }

    fn status() -> CondensedStatus {
        CondensedStatus {
            moisture: Some(42.0),
            health: 90,
            light: Some(900.0),
            temperature: Some(22.0),
            humidity: None,
            status: crate::model::HealthStatus::Healthy,
            battery: Some(80.0),
            last_updated: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn publish_is_refused_while_the_broker_is_down() {
        let options = MqttOptions::new("plant-test", "localhost", 1883);
        let (client, _eventloop) = AsyncClient::new(options, 10);
        let publisher = MqttStatePublisher::from_client(client, Duration::from_millis(50));

        let err = publisher
            .publish_status("plant-001", &status())
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Connection(_)));

        publisher.connected.store(true, Ordering::SeqCst);
        publisher.publish_status("plant-001", &status()).await.unwrap();
    }
}
