use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::model::StoredReading;

/// Append-only reading log. `document` holds the enriched reading verbatim;
/// score and status are lifted out for querying.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "sensor_readings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub device_id: String,
    pub captured_at: DateTimeWithTimeZone,
    #[sea_orm(column_type = "JsonBinary")]
    pub document: Json,
    pub health_score: Option<i32>,
    pub status: Option<String>,
    pub processed_at: DateTimeWithTimeZone,
    pub processed_by: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for StoredReading {
    fn from(model: Model) -> Self {
        StoredReading {
            id: model.id,
            device_id: model.device_id,
            captured_at: model.captured_at.with_timezone(&chrono::Utc),
            health_score: model.health_score,
            status: model.status,
            document: model.document,
        }
    }
}
