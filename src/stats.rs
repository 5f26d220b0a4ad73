use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::connection::ConnectionState;

/// Progress counters shared between the ingestion loop and the health server.
#[derive(Debug, Default)]
pub struct PipelineStats {
    received: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    malformed: AtomicU64,
    unprofiled: AtomicU64,
    alerts_raised: AtomicU64,
    state: AtomicU8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub processed: u64,
    pub failed: u64,
    pub malformed: u64,
    pub unprofiled: u64,
    pub alerts_raised: u64,
    pub state: &'static str,
}

impl PipelineStats {
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unprofiled(&self) {
        self.unprofiled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alerts(&self, count: usize) {
        self.alerts_raised.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state.store(state.code(), Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.state.load(Ordering::Relaxed) == ConnectionState::Connected.code()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            unprofiled: self.unprofiled.load(Ordering::Relaxed),
            alerts_raised: self.alerts_raised.load(Ordering::Relaxed),
            state: ConnectionState::label_for(self.state.load(Ordering::Relaxed)),
        }
    }
}
