use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::metrics;
use crate::model::{Alert, Issue};
use crate::notifications::{AlertChannel, PublishError};
use crate::store::{AlertStore, StoreError};

/// Outcome of dispatching one reading's issues.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub persisted: usize,
    pub published: usize,
    pub publish_failures: usize,
}

/// Turns assessment issues into alerts: persist first, then publish.
///
/// Each issue is handled on its own. A publish failure is logged and counted;
/// a persistence failure skips that issue's publish. Every issue is attempted
/// before the first persistence error is returned.
pub struct AlertDispatcher {
    store: Arc<dyn AlertStore>,
    channel: Box<dyn AlertChannel>,
    timeout: Duration,
}

impl AlertDispatcher {
    pub fn new(store: Arc<dyn AlertStore>, channel: Box<dyn AlertChannel>) -> Self {
        Self {
            store,
            channel,
            timeout: Duration::from_secs(30),
        }
    }

    /// Bounds each store and publish call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn dispatch(
        &self,
        device_id: &str,
        issues: &[Issue],
    ) -> Result<DispatchReport, StoreError> {
        let mut report = DispatchReport::default();
        let mut first_error: Option<StoreError> = None;

        for issue in issues {
            let alert = Alert::from_issue(device_id, issue, Utc::now());
            metrics::increment_alerts_generated(alert.alert_type, alert.severity);

            let stored = tokio::time::timeout(self.timeout, self.store.store_alert(&alert))
                .await
                .unwrap_or(Err(StoreError::Timeout(self.timeout)));
            match stored {
                Ok(id) => {
                    report.persisted += 1;
                    info!("Stored {} alert {} for {}", alert.alert_type, id, device_id);
                }
                Err(e) => {
                    error!(
                        "Failed to store {} alert for {}: {}",
                        alert.alert_type, device_id, e
                    );
                    first_error.get_or_insert(e);
                    continue;
                }
            }

            let published = tokio::time::timeout(self.timeout, self.channel.publish_alert(&alert))
                .await
                .unwrap_or(Err(PublishError::Timeout(self.timeout)));
            match published {
                Ok(()) => report.published += 1,
                Err(e) => {
                    report.publish_failures += 1;
                    metrics::increment_publish_failed("alerts");
                    warn!(
                        "Failed to publish {} alert for {}: {}",
                        alert.alert_type, device_id, e
                    );
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    pub async fn close(&mut self) -> Result<(), PublishError> {
        self.channel.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IssueType;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct Alerts {
        stored: Mutex<Vec<Alert>>,
        fail_on: Option<IssueType>,
    }

    #[async_trait]
    impl AlertStore for Alerts {
        async fn store_alert(&self, alert: &Alert) -> Result<Uuid, StoreError> {
            if self.fail_on == Some(alert.alert_type) {
                return Err(StoreError::Database(sea_orm::DbErr::Custom("down".into())));
            }
            self.stored.lock().unwrap().push(alert.clone());
            Ok(alert.id)
        }
    }

    struct Channel {
        sent: Arc<Mutex<Vec<Alert>>>,
        fail_on: Option<IssueType>,
    }

    struct StalledChannel;

    #[async_trait]
    impl AlertChannel for StalledChannel {
        async fn publish_alert(&self, _alert: &Alert) -> Result<(), PublishError> {
            std::future::pending().await
        }
    }

    #[async_trait]
    impl AlertChannel for Channel {
        async fn publish_alert(&self, alert: &Alert) -> Result<(), PublishError> {
            if self.fail_on == Some(alert.alert_type) {
                return Err(PublishError::Publish("unavailable".into()));
            }
            self.sent.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    fn issues() -> Vec<Issue> {
        vec![
            Issue::new(IssueType::WaterNeeded, "Soil moisture too low: 15% (needs 40%+)"),
            Issue::new(IssueType::LowBattery, "Sensor battery low: 10%"),
        ]
    }

    fn dispatcher(
        store_fail: Option<IssueType>,
        publish_fail: Option<IssueType>,
    ) -> (AlertDispatcher, Arc<Alerts>, Arc<Mutex<Vec<Alert>>>) {
        let store = Arc::new(Alerts {
            fail_on: store_fail,
            ..Default::default()
        });
        let sent = Arc::new(Mutex::new(Vec::new()));
        let channel = Channel {
            sent: sent.clone(),
            fail_on: publish_fail,
        };
        (
            AlertDispatcher::new(store.clone(), Box::new(channel)),
            store,
            sent,
        )
    }

    #[tokio::test]
    async fn one_alert_per_issue() {
        let (dispatcher, store, sent) = dispatcher(None, None);
        let report = dispatcher.dispatch("plant-001", &issues()).await.unwrap();

        assert_eq!(report.persisted, 2);
        assert_eq!(report.published, 2);

        let stored = store.stored.lock().unwrap();
        assert_eq!(stored[0].alert_type, IssueType::WaterNeeded);
        assert_eq!(stored[0].message, "Soil moisture too low: 15% (needs 40%+)");
        assert_eq!(stored[1].severity, IssueType::LowBattery.severity());
        assert_eq!(sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn publish_failure_does_not_block_later_alerts() {
        let (dispatcher, store, sent) = dispatcher(None, Some(IssueType::WaterNeeded));
        let report = dispatcher.dispatch("plant-001", &issues()).await.unwrap();

        assert_eq!(report.persisted, 2);
        assert_eq!(report.publish_failures, 1);
        assert_eq!(store.stored.lock().unwrap().len(), 2);
        assert_eq!(sent.lock().unwrap()[0].alert_type, IssueType::LowBattery);
    }

    #[tokio::test]
    async fn store_failure_skips_publish_but_continues() {
        let (dispatcher, store, sent) = dispatcher(Some(IssueType::WaterNeeded), None);
        let result = dispatcher.dispatch("plant-001", &issues()).await;

        assert!(result.is_err());
        assert_eq!(store.stored.lock().unwrap().len(), 1);
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].alert_type, IssueType::LowBattery);
    }

    #[tokio::test]
    async fn stalled_channel_times_out_per_alert() {
        let store = Arc::new(Alerts::default());
        let dispatcher = AlertDispatcher::new(store.clone(), Box::new(StalledChannel))
            .with_timeout(Duration::from_millis(20));

        let report = dispatcher.dispatch("plant-001", &issues()).await.unwrap();

        assert_eq!(report.persisted, 2);
        assert_eq!(report.publish_failures, 2);
        assert_eq!(store.stored.lock().unwrap().len(), 2);
    }
}
