#![allow(dead_code)]

use async_trait::async_trait;
use plant_care_pipeline::dispatcher::AlertDispatcher;
use plant_care_pipeline::model::{
    Alert, CareProfile, CondensedStatus, EnrichedReading, IssueType, StoredReading,
};
use plant_care_pipeline::notifications::{AlertChannel, PublishError, StatePublisher};
use plant_care_pipeline::sea_orm::DbErr;
use plant_care_pipeline::source::{InboundMessage, ReadingSource, SourceError};
use plant_care_pipeline::store::{AlertStore, ProfileStore, ReadingStore, StoreError};
use plant_care_pipeline::worker::{Collaborators, IngestionLoop, WorkerSettings};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub enum Step {
    Deliver(InboundMessage),
    /// The next pull fails as if the broker connection dropped.
    Fail,
    /// Runs a side effect between pulls.
    Run(Box<dyn FnOnce() + Send>),
}

#[derive(Default)]
pub struct SourceLog {
    pub connects: usize,
    pub acked: Vec<String>,
    pub closed: bool,
}

/// Scripted inbound channel. Cancels the shutdown token once the script is
/// exhausted so `run` returns.
pub struct FakeSource {
    steps: VecDeque<Step>,
    failing_connects: usize,
    shutdown: CancellationToken,
    pub log: Arc<Mutex<SourceLog>>,
}

impl FakeSource {
    pub fn new(steps: Vec<Step>, shutdown: CancellationToken) -> Self {
        Self {
            steps: steps.into(),
            failing_connects: 0,
            shutdown,
            log: Arc::new(Mutex::new(SourceLog::default())),
        }
    }

    pub fn failing_connects(mut self, count: usize) -> Self {
        self.failing_connects = count;
        self
    }
}

#[async_trait]
impl ReadingSource for FakeSource {
    async fn connect(&mut self) -> Result<(), SourceError> {
        if self.failing_connects > 0 {
            self.failing_connects -= 1;
            return Err(SourceError::Connection("connection refused".into()));
        }
        self.log.lock().unwrap().connects += 1;
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<InboundMessage>, SourceError> {
        match self.steps.pop_front() {
            Some(Step::Deliver(message)) => Ok(Some(message)),
            Some(Step::Fail) => Err(SourceError::Read("connection reset".into())),
            Some(Step::Run(effect)) => {
                effect();
                Ok(None)
            }
            None => {
                self.shutdown.cancel();
                Ok(None)
            }
        }
    }

    async fn ack(&mut self, message_id: &str) -> Result<(), SourceError> {
        self.log.lock().unwrap().acked.push(message_id.to_string());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        self.log.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Profiles, readings and alerts held in memory.
#[derive(Default)]
pub struct MemoryStore {
    pub profiles: Mutex<HashMap<String, CareProfile>>,
    pub readings: Mutex<Vec<EnrichedReading>>,
    pub alerts: Mutex<Vec<Alert>>,
    pub fail_readings_for: Mutex<Option<String>>,
    pub fail_alerts: AtomicBool,
    /// Cancelled from inside the next profile lookup.
    pub cancel_on_lookup: Mutex<Option<CancellationToken>>,
    /// Profile lookups for this device never complete.
    pub stall_lookup_for: Mutex<Option<String>>,
    pub closed: AtomicBool,
}

impl MemoryStore {
    pub fn with_profile(self, profile: CareProfile) -> Self {
        self.profiles
            .lock()
            .unwrap()
            .insert(profile.device_id.clone(), profile);
        self
    }

    pub fn readings(&self) -> Vec<EnrichedReading> {
        self.readings.lock().unwrap().clone()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }
}

fn unavailable() -> StoreError {
    StoreError::Database(DbErr::Custom("database unavailable".into()))
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn find_profile(&self, device_id: &str) -> Result<Option<CareProfile>, StoreError> {
        if let Some(token) = self.cancel_on_lookup.lock().unwrap().take() {
            token.cancel();
        }
        let stalled = self.stall_lookup_for.lock().unwrap().as_deref() == Some(device_id);
        if stalled {
            std::future::pending::<()>().await;
        }
        Ok(self.profiles.lock().unwrap().get(device_id).cloned())
    }

    async fn profiled_devices(&self) -> Result<Vec<String>, StoreError> {
        let mut devices: Vec<String> = self.profiles.lock().unwrap().keys().cloned().collect();
        devices.sort();
        Ok(devices)
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn store_reading(&self, reading: &EnrichedReading) -> Result<Uuid, StoreError> {
        if self.fail_readings_for.lock().unwrap().as_deref() == Some(reading.device_id()) {
            return Err(unavailable());
        }
        self.readings.lock().unwrap().push(reading.clone());
        Ok(Uuid::new_v4())
    }

    async fn recent_readings(
        &self,
        device_id: &str,
        limit: u64,
    ) -> Result<Vec<StoredReading>, StoreError> {
        let readings = self.readings.lock().unwrap();
        Ok(readings
            .iter()
            .rev()
            .filter(|r| r.device_id() == device_id)
            .take(limit as usize)
            .map(|r| StoredReading {
                id: Uuid::new_v4(),
                device_id: r.device_id().to_string(),
                captured_at: r.reading.captured_at,
                health_score: r.assessment.as_ref().map(|a| a.health_score),
                status: r.assessment.as_ref().map(|a| a.status.as_str().to_string()),
                document: serde_json::to_value(r).unwrap_or_default(),
            })
            .collect())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn store_alert(&self, alert: &Alert) -> Result<Uuid, StoreError> {
        if self.fail_alerts.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(alert.id)
    }
}

#[derive(Clone, Default)]
pub struct RecordingAlertChannel {
    pub sent: Arc<Mutex<Vec<Alert>>>,
    pub fail_on: Option<IssueType>,
    pub closed: Arc<AtomicBool>,
}

#[async_trait]
impl AlertChannel for RecordingAlertChannel {
    async fn publish_alert(&self, alert: &Alert) -> Result<(), PublishError> {
        if self.fail_on == Some(alert.alert_type) {
            return Err(PublishError::Publish("topic unavailable".into()));
        }
        self.sent.lock().unwrap().push(alert.clone());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PublishError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone)]
pub struct RecordingPublisher {
    pub statuses: Arc<Mutex<Vec<(String, CondensedStatus)>>>,
    pub announcements: Arc<Mutex<Vec<Vec<String>>>>,
    pub session: Arc<AtomicU64>,
    pub closed: Arc<AtomicBool>,
}

impl Default for RecordingPublisher {
    fn default() -> Self {
        Self {
            statuses: Arc::default(),
            announcements: Arc::default(),
            session: Arc::new(AtomicU64::new(1)),
            closed: Arc::default(),
        }
    }
}

#[async_trait]
impl StatePublisher for RecordingPublisher {
    async fn publish_status(
        &self,
        device_id: &str,
        status: &CondensedStatus,
    ) -> Result<(), PublishError> {
        self.statuses
            .lock()
            .unwrap()
            .push((device_id.to_string(), status.clone()));
        Ok(())
    }

    async fn announce(&self, device_ids: &[String]) -> Result<(), PublishError> {
        self.announcements.lock().unwrap().push(device_ids.to_vec());
        Ok(())
    }

    fn session(&self) -> u64 {
        self.session.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> Result<(), PublishError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A wired-up loop plus handles to every fake it talks to.
pub struct Harness {
    pub ingestion: IngestionLoop,
    pub shutdown: CancellationToken,
    pub source: Arc<Mutex<SourceLog>>,
    pub store: Arc<MemoryStore>,
    pub alerts: RecordingAlertChannel,
    pub publisher: RecordingPublisher,
}

pub fn harness(
    steps: Vec<Step>,
    store: MemoryStore,
    alerts: RecordingAlertChannel,
    publisher: RecordingPublisher,
) -> Harness {
    let shutdown = CancellationToken::new();
    let source = FakeSource::new(steps, shutdown.clone());
    harness_with_source(source, shutdown, store, alerts, publisher)
}

pub fn harness_with_source(
    source: FakeSource,
    shutdown: CancellationToken,
    store: MemoryStore,
    alerts: RecordingAlertChannel,
    publisher: RecordingPublisher,
) -> Harness {
    let store = Arc::new(store);
    let source_log = source.log.clone();

    let collaborators = Collaborators {
        source: Box::new(source),
        profiles: store.clone(),
        readings: store.clone(),
        dispatcher: AlertDispatcher::new(store.clone(), Box::new(alerts.clone()))
            .with_timeout(Duration::from_millis(100)),
        publisher: Box::new(publisher.clone()),
    };
    let settings = WorkerSettings {
        processor_id: "test-processor".to_string(),
        discovery_devices: vec!["plant-900".to_string()],
        reconnect_base: Duration::from_millis(1),
        max_backoff: Duration::from_millis(10),
        operation_timeout: Duration::from_millis(100),
    };

    Harness {
        ingestion: IngestionLoop::new(collaborators, settings),
        shutdown,
        source: source_log,
        store,
        alerts,
        publisher,
    }
}

pub fn profile(device_id: &str) -> CareProfile {
    CareProfile {
        profile_id: format!("profile-{}", device_id),
        device_id: device_id.to_string(),
        moisture_min: 40.0,
        moisture_max: 60.0,
        light_min: Some(800.0),
        temp_min: Some(18.0),
        temp_max: Some(26.0),
    }
}

pub fn message(id: &str, payload: &str) -> Step {
    Step::Deliver(InboundMessage {
        id: id.to_string(),
        key: None,
        payload: payload.as_bytes().to_vec(),
    })
}

pub fn reading(device_id: &str, moisture: f64, battery: f64) -> String {
    serde_json::json!({
        "deviceId": device_id,
        "capturedAt": "2026-10-01T12:00:00Z",
        "measurements": {
            "soilMoisture": moisture,
            "lightLevel": 900,
            "temperature": 22,
            "humidity": 55
        },
        "metadata": { "batteryLevel": battery },
        "plantType": "monstera"
    })
    .to_string()
}
