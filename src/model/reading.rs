use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::HealthAssessment;
use crate::error::PipelineError;

pub const SOIL_MOISTURE: &str = "soilMoisture";
pub const LIGHT_LEVEL: &str = "lightLevel";
pub const TEMPERATURE: &str = "temperature";
pub const HUMIDITY: &str = "humidity";
pub const BATTERY_LEVEL: &str = "batteryLevel";

/// Top-level keys written by this worker. A producer sending them would
/// otherwise end up duplicated in the stored document.
const PROCESSING_FIELDS: [&str; 4] = ["processedAt", "processedBy", "assessment", "analyzedAt"];

/// One telemetry sample as produced by a plant sensor.
///
/// Older sensor firmware publishes `plantId`, `timestamp` and `sensors`; those
/// names are accepted alongside the current ones. Fields the pipeline does not
/// interpret (`plantType`, `location`, ...) are kept in `extra` and stored as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    #[serde(alias = "plantId")]
    pub device_id: String,
    #[serde(alias = "timestamp")]
    pub captured_at: DateTime<Utc>,
    #[serde(alias = "sensors", default, deserialize_with = "known_measurements")]
    pub measurements: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Reading {
    pub fn from_json(payload: &[u8]) -> Result<Self, PipelineError> {
        let mut reading: Reading = serde_json::from_slice(payload)
            .map_err(|e| PipelineError::Malformed(e.to_string()))?;
        if reading.device_id.trim().is_empty() {
            return Err(PipelineError::Malformed("empty deviceId".to_string()));
        }
        for field in PROCESSING_FIELDS {
            reading.extra.remove(field);
        }
        Ok(reading)
    }

    /// Returns `None` when the device did not report the metric.
    pub fn measurement(&self, name: &str) -> Option<f64> {
        self.measurements.get(name).copied()
    }

    pub fn soil_moisture(&self) -> Option<f64> {
        self.measurement(SOIL_MOISTURE)
    }

    pub fn light_level(&self) -> Option<f64> {
        self.measurement(LIGHT_LEVEL)
    }

    pub fn temperature(&self) -> Option<f64> {
        self.measurement(TEMPERATURE)
    }

    pub fn humidity(&self) -> Option<f64> {
        self.measurement(HUMIDITY)
    }

    pub fn battery_level(&self) -> Option<f64> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(BATTERY_LEVEL))
            .and_then(Value::as_f64)
    }
}

/// Sensors report an unreadable metric as `null`; it is treated as absent.
fn known_measurements<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Option<f64>>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect())
}

/// A reading plus the processing metadata appended by this worker.
/// Raw measurement fields are never touched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedReading {
    #[serde(flatten)]
    pub reading: Reading,
    pub processed_at: DateTime<Utc>,
    pub processed_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment: Option<HealthAssessment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyzed_at: Option<DateTime<Utc>>,
}

impl EnrichedReading {
    pub fn new(
        reading: Reading,
        processed_at: DateTime<Utc>,
        processed_by: impl Into<String>,
        assessment: Option<HealthAssessment>,
    ) -> Self {
        let analyzed_at = assessment.as_ref().map(|_| processed_at);
        Self {
            reading,
            processed_at,
            processed_by: processed_by.into(),
            assessment,
            analyzed_at,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.reading.device_id
    }
}

/// A persisted reading as returned by history queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredReading {
    pub id: uuid::Uuid,
    pub device_id: String,
    pub captured_at: DateTime<Utc>,
    pub health_score: Option<i32>,
    pub status: Option<String>,
    pub document: Value,
}
