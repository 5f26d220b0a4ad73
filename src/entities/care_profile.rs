use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::model::CareProfile;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "care_profiles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub profile_id: String,
    #[sea_orm(unique)]
    pub device_id: String,
    pub moisture_min: f64,
    pub moisture_max: f64,
    pub light_min: Option<f64>,
    pub temp_min: Option<f64>,
    pub temp_max: Option<f64>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for CareProfile {
    fn from(model: Model) -> Self {
        CareProfile {
            profile_id: model.profile_id,
            device_id: model.device_id,
            moisture_min: model.moisture_min,
            moisture_max: model.moisture_max,
            light_min: model.light_min,
            temp_min: model.temp_min,
            temp_max: model.temp_max,
        }
    }
}
