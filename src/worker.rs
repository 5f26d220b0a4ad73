use chrono::Utc;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::analyzer;
use crate::connection::{backoff, ConnectionEvent, ConnectionState};
use crate::dispatcher::AlertDispatcher;
use crate::error::PipelineError;
use crate::metrics::{self, InsertRate};
use crate::model::{CondensedStatus, EnrichedReading, Reading};
use crate::notifications::{PublishError, StatePublisher};
use crate::source::{InboundMessage, ReadingSource, SourceError};
use crate::stats::PipelineStats;
use crate::store::{ProfileStore, ReadingStore, StoreError};

const INSERT_RATE_WINDOW: Duration = Duration::from_secs(10);

/// Everything the loop talks to. Built and connected by the caller; the loop
/// closes them when it drains.
pub struct Collaborators {
    pub source: Box<dyn ReadingSource>,
    pub profiles: Arc<dyn ProfileStore>,
    pub readings: Arc<dyn ReadingStore>,
    pub dispatcher: AlertDispatcher,
    pub publisher: Box<dyn StatePublisher>,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Stamped on every stored reading as `processedBy`.
    pub processor_id: String,
    /// Announced for discovery in addition to every profiled device.
    pub discovery_devices: Vec<String>,
    pub reconnect_base: Duration,
    pub max_backoff: Duration,
    /// Upper bound on each collaborator call made for one reading. Hitting it
    /// fails that reading only.
    pub operation_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Analyzed { alerts: usize },
    Unprofiled,
}

/// Single-consumer pipeline: one reading is fully processed and acknowledged
/// before the next is pulled.
pub struct IngestionLoop {
    collaborators: Collaborators,
    settings: WorkerSettings,
    stats: Arc<PipelineStats>,
    state: ConnectionState,
    announced_session: Option<u64>,
    insert_rate: InsertRate,
}

impl IngestionLoop {
    pub fn new(collaborators: Collaborators, settings: WorkerSettings) -> Self {
        Self {
            collaborators,
            settings,
            stats: Arc::new(PipelineStats::default()),
            state: ConnectionState::Disconnected,
            announced_session: None,
            insert_rate: InsertRate::new(INSERT_RATE_WINDOW, Instant::now()),
        }
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn transition(&mut self, event: ConnectionEvent) {
        let next = self.state.on(event);
        if next != self.state {
            tracing::debug!("Connection {} -> {} on {:?}", self.state, next, event);
        }
        self.state = next;
        self.stats.set_state(next);
    }

    /// First connection to the inbound channel. A failure here is fatal to
    /// the process, unlike mid-stream failures which are retried.
    pub async fn start(&mut self) -> Result<(), SourceError> {
        self.transition(ConnectionEvent::Connect);
        if let Err(e) = self.collaborators.source.connect().await {
            metrics::increment_connection_errors("redis", e.kind());
            self.transition(ConnectionEvent::Failed);
            return Err(e);
        }
        self.transition(ConnectionEvent::Established);
        self.announce().await;
        Ok(())
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!("Ingestion loop started as {}", self.settings.processor_id);

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let state = self.state;
            match state {
                ConnectionState::Disconnected => self.transition(ConnectionEvent::Connect),
                ConnectionState::Connecting { attempt } => {
                    if attempt > 0 {
                        let delay =
                            backoff(attempt, self.settings.reconnect_base, self.settings.max_backoff);
                        tracing::info!("Reconnecting in {:?} (attempt {})", delay, attempt + 1);
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    metrics::increment_reconnects();
                    match self.collaborators.source.connect().await {
                        Ok(()) => {
                            tracing::info!("Inbound channel reconnected");
                            self.transition(ConnectionEvent::Established);
                        }
                        Err(e) => {
                            metrics::increment_connection_errors("redis", e.kind());
                            tracing::warn!("Reconnect failed: {}", e);
                            self.transition(ConnectionEvent::Failed);
                        }
                    }
                }
                ConnectionState::Connected => {
                    self.insert_rate.flush(Instant::now());
                    if self.announced_session != Some(self.collaborators.publisher.session()) {
                        self.announce().await;
                    }

                    let next = tokio::select! {
                        _ = shutdown.cancelled() => break,
                        next = self.collaborators.source.next_message() => next,
                    };

                    match next {
                        Ok(Some(message)) => self.handle(message).await,
                        Ok(None) => {}
                        Err(e) => {
                            metrics::increment_connection_errors("redis", e.kind());
                            tracing::error!("Lost inbound channel: {}", e);
                            self.transition(ConnectionEvent::Failed);
                            tokio::select! {
                                _ = shutdown.cancelled() => break,
                                _ = tokio::time::sleep(self.settings.reconnect_base) => {}
                            }
                        }
                    }
                }
                ConnectionState::Draining => break,
            }
        }

        self.drain().await;
    }

    /// Publishes discovery for configured and profiled devices. Best effort:
    /// a failure is logged and retried only on the next broker session.
    async fn announce(&mut self) {
        let session = self.collaborators.publisher.session();
        let mut devices: BTreeSet<String> =
            self.settings.discovery_devices.iter().cloned().collect();

        match self.collaborators.profiles.profiled_devices().await {
            Ok(profiled) => devices.extend(profiled),
            Err(e) => tracing::warn!("Could not list profiled devices for discovery: {}", e),
        }

        let devices: Vec<String> = devices.into_iter().collect();
        if let Err(e) = self.collaborators.publisher.announce(&devices).await {
            metrics::increment_publish_failed("discovery");
            tracing::warn!("Discovery announcement failed: {}", e);
        }
        self.announced_session = Some(session);
    }

    async fn handle(&mut self, message: InboundMessage) {
        self.stats.record_received();
        let started = Instant::now();

        match Reading::from_json(&message.payload) {
            Err(e) => {
                self.stats.record_malformed();
                metrics::record_message_processed("malformed");
                tracing::warn!(message_id = %message.id, "Dropping malformed reading: {}", e);
            }
            Ok(reading) => {
                let device_id = reading.device_id.clone();
                let span = tracing::info_span!(
                    "process_reading",
                    "otel.name" = "process_reading",
                    device_id = %device_id,
                    message_id = %message.id
                );

                let result = self.process(reading).instrument(span).await;
                if matches!(result, Ok(_) | Err(PipelineError::AlertStore(_))) {
                    self.insert_rate.record();
                }

                match result {
                    Ok(Outcome::Analyzed { alerts }) => {
                        self.stats.record_processed();
                        self.stats.record_alerts(alerts);
                        metrics::record_message_processed("success");
                    }
                    Ok(Outcome::Unprofiled) => {
                        self.stats.record_processed();
                        self.stats.record_unprofiled();
                        metrics::record_message_processed("unprofiled");
                    }
                    Err(e) => {
                        self.stats.record_failed();
                        metrics::record_message_processed("error");
                        tracing::error!(
                            device_id = %device_id,
                            message_id = %message.id,
                            stage = e.stage(),
                            "Failed to process reading: {}",
                            e
                        );
                    }
                }
            }
        }
        metrics::record_stage_duration("total", started.elapsed().as_secs_f64());

        if let Err(e) = self.collaborators.source.ack(&message.id).await {
            metrics::increment_connection_errors("redis", e.kind());
            tracing::error!(message_id = %message.id, "Failed to acknowledge: {}", e);
            self.transition(ConnectionEvent::Failed);
        }
    }

    async fn process(&self, reading: Reading) -> Result<Outcome, PipelineError> {
        let c = &self.collaborators;
        let device_id = reading.device_id.clone();

        let stage = Instant::now();
        let profile = self
            .bounded(c.profiles.find_profile(&device_id))
            .await
            .map_err(PipelineError::ProfileLookup)?;
        metrics::record_stage_duration("profile_lookup", stage.elapsed().as_secs_f64());

        let assessment = match &profile {
            Some(profile) => {
                let stage = Instant::now();
                let assessment = analyzer::analyze(&reading, profile);
                metrics::record_stage_duration("analyze", stage.elapsed().as_secs_f64());
                tracing::info!(
                    "Health score {} ({}) with {} issues",
                    assessment.health_score,
                    assessment.status,
                    assessment.issues.len()
                );
                Some(assessment)
            }
            None => {
                tracing::info!("No care profile for {}, storing without analysis", device_id);
                None
            }
        };

        let processed_at = Utc::now();
        let enriched =
            EnrichedReading::new(reading, processed_at, &self.settings.processor_id, assessment);

        let stage = Instant::now();
        let id = self
            .bounded(c.readings.store_reading(&enriched))
            .await
            .map_err(PipelineError::ReadingStore)?;
        metrics::record_stage_duration("reading_store", stage.elapsed().as_secs_f64());
        tracing::debug!("Stored reading {}", id);

        let Some(assessment) = enriched.assessment.as_ref() else {
            return Ok(Outcome::Unprofiled);
        };
        metrics::set_health_score(&device_id, assessment);

        let mut alerts = 0;
        if !assessment.issues.is_empty() {
            let stage = Instant::now();
            let report = c
                .dispatcher
                .dispatch(&device_id, &assessment.issues)
                .await
                .map_err(PipelineError::AlertStore)?;
            metrics::record_stage_duration("alert_dispatch", stage.elapsed().as_secs_f64());
            alerts = report.persisted;
        }

        let stage = Instant::now();
        let status = CondensedStatus::new(&enriched.reading, assessment, processed_at);
        let limit = self.settings.operation_timeout;
        let published = tokio::time::timeout(limit, c.publisher.publish_status(&device_id, &status))
            .await
            .unwrap_or(Err(PublishError::Timeout(limit)));
        if let Err(e) = published {
            metrics::increment_publish_failed("status");
            tracing::warn!("Failed to publish status for {}: {}", device_id, e);
        }
        metrics::record_stage_duration("status_publish", stage.elapsed().as_secs_f64());

        let latency = Utc::now() - enriched.reading.captured_at;
        metrics::record_pipeline_latency(latency.num_milliseconds() as f64 / 1000.0);

        Ok(Outcome::Analyzed { alerts })
    }

    async fn bounded<T>(
        &self,
        operation: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        let limit = self.settings.operation_timeout;
        tokio::time::timeout(limit, operation)
            .await
            .unwrap_or(Err(StoreError::Timeout(limit)))
    }

    async fn drain(mut self) {
        self.transition(ConnectionEvent::Shutdown);
        tracing::info!("Draining ingestion loop");

        let c = &mut self.collaborators;
        if let Err(e) = c.source.close().await {
            tracing::warn!("Error closing inbound channel: {}", e);
        }
        if let Err(e) = c.dispatcher.close().await {
            tracing::warn!("Error closing alert channel: {}", e);
        }
        if let Err(e) = c.publisher.close().await {
            tracing::warn!("Error closing state publisher: {}", e);
        }
        if let Err(e) = c.readings.close().await {
            tracing::warn!("Error closing reading store: {}", e);
        }

        self.transition(ConnectionEvent::Drained);
        let stats = self.stats.snapshot();
        tracing::info!(
            received = stats.received,
            processed = stats.processed,
            failed = stats.failed,
            malformed = stats.malformed,
            "Ingestion loop stopped"
        );
    }
}
