//! Persistence seams used by the ingestion loop.
//!
//! Profiles are read-only. Readings and alerts are append-only; there is no
//! idempotency key, so a redelivered message is stored a second time.

pub mod postgres;

use async_trait::async_trait;
use sea_orm::DbErr;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::model::{Alert, CareProfile, EnrichedReading, StoredReading};

pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    /// Label for errors caused by the database being unreachable rather than
    /// by the query itself.
    pub fn connection_error_kind(&self) -> Option<&'static str> {
        match self {
            StoreError::Timeout(_) => Some("timeout"),
            StoreError::Database(DbErr::Conn(_)) => Some("connection"),
            StoreError::Database(DbErr::ConnectionAcquire(_)) => Some("acquire"),
            _ => None,
        }
    }
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// `Ok(None)` when no profile is provisioned for the device.
    async fn find_profile(&self, device_id: &str) -> Result<Option<CareProfile>, StoreError>;

    /// Devices that have a profile, used for automation discovery.
    async fn profiled_devices(&self) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn store_reading(&self, reading: &EnrichedReading) -> Result<Uuid, StoreError>;

    /// Most recent first.
    async fn recent_readings(
        &self,
        device_id: &str,
        limit: u64,
    ) -> Result<Vec<StoredReading>, StoreError>;

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn store_alert(&self, alert: &Alert) -> Result<Uuid, StoreError>;
}
