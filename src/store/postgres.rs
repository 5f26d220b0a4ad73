use async_trait::async_trait;
use sea_orm::{
    ColumnTrait, ConnectOptions, Database, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use sea_orm_migration::MigratorTrait;
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

use super::{AlertStore, ProfileStore, ReadingStore, StoreError};
use crate::entities::{alerts, care_profile, sensor_reading};
use crate::metrics;
use crate::migrator::Migrator;
use crate::model::{Alert, CareProfile, EnrichedReading, StoredReading};

/// PostgreSQL-backed profile, reading and alert store.
///
/// Every query is bounded by `op_timeout` so a stalled database fails the
/// current reading instead of hanging the worker.
pub struct PgStore {
    db: DatabaseConnection,
    op_timeout: Duration,
}

impl PgStore {
    pub async fn open(
        database_url: &str,
        connect_timeout: Duration,
        op_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let mut options = ConnectOptions::new(database_url.to_owned());
        options
            .connect_timeout(connect_timeout)
            .acquire_timeout(op_timeout)
            .sqlx_logging(false);

        let db = tokio::time::timeout(connect_timeout, Database::connect(options))
            .await
            .map_err(|_| StoreError::Timeout(connect_timeout))??;

        tracing::info!("Connected to PostgreSQL");
        Ok(Self::from_connection(db, op_timeout))
    }

    pub fn from_connection(db: DatabaseConnection, op_timeout: Duration) -> Self {
        Self { db, op_timeout }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        Migrator::up(&self.db, None).await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    async fn bounded<T>(
        &self,
        query: impl Future<Output = Result<T, DbErr>>,
    ) -> Result<T, StoreError> {
        let result = match tokio::time::timeout(self.op_timeout, query).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout(self.op_timeout)),
        };
        if let Err(e) = &result {
            if let Some(kind) = e.connection_error_kind() {
                metrics::increment_connection_errors("postgres", kind);
            }
        }
        result
    }
}

#[async_trait]
impl ProfileStore for PgStore {
    async fn find_profile(&self, device_id: &str) -> Result<Option<CareProfile>, StoreError> {
        let model = self
            .bounded(
                care_profile::Entity::find()
                    .filter(care_profile::Column::DeviceId.eq(device_id))
                    .one(&self.db),
            )
            .await?;
        Ok(model.map(CareProfile::from))
    }

    async fn profiled_devices(&self) -> Result<Vec<String>, StoreError> {
        self.bounded(
            care_profile::Entity::find()
                .select_only()
                .column(care_profile::Column::DeviceId)
                .order_by_asc(care_profile::Column::DeviceId)
                .into_tuple::<String>()
                .all(&self.db),
        )
        .await
    }
}

#[async_trait]
impl ReadingStore for PgStore {
    async fn store_reading(&self, reading: &EnrichedReading) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        let document = serde_json::to_value(reading)?;
        let assessment = reading.assessment.as_ref();

        let active = sensor_reading::ActiveModel {
            id: Set(id),
            device_id: Set(reading.device_id().to_string()),
            captured_at: Set(reading.reading.captured_at.into()),
            document: Set(document),
            health_score: Set(assessment.map(|a| a.health_score)),
            status: Set(assessment.map(|a| a.status.as_str().to_string())),
            processed_at: Set(reading.processed_at.into()),
            processed_by: Set(reading.processed_by.clone()),
        };

        self.bounded(sensor_reading::Entity::insert(active).exec_without_returning(&self.db))
            .await?;
        Ok(id)
    }

    async fn recent_readings(
        &self,
        device_id: &str,
        limit: u64,
    ) -> Result<Vec<StoredReading>, StoreError> {
        let rows = self
            .bounded(
                sensor_reading::Entity::find()
                    .filter(sensor_reading::Column::DeviceId.eq(device_id))
                    .order_by_desc(sensor_reading::Column::CapturedAt)
                    .limit(limit)
                    .all(&self.db),
            )
            .await?;
        Ok(rows.into_iter().map(StoredReading::from).collect())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.db.close_by_ref().await?;
        tracing::info!("PostgreSQL connection pool closed");
        Ok(())
    }
}

#[async_trait]
impl AlertStore for PgStore {
    async fn store_alert(&self, alert: &Alert) -> Result<Uuid, StoreError> {
        let active = alerts::ActiveModel {
            id: Set(alert.id),
            device_id: Set(alert.device_id.clone()),
            alert_type: Set(alert.alert_type.as_str().to_string()),
            severity: Set(alert.severity.as_str().to_string()),
            message: Set(alert.message.clone()),
            created_at: Set(alert.timestamp.into()),
        };

        self.bounded(alerts::Entity::insert(active).exec_without_returning(&self.db))
            .await?;
        Ok(alert.id)
    }
}
