use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{HealthAssessment, HealthStatus, Reading};

/// The flat, last-write-wins view of a device consumed by home automation.
/// Metrics the device did not report are published as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CondensedStatus {
    pub moisture: Option<f64>,
    pub health: i32,
    pub light: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub status: HealthStatus,
    pub battery: Option<f64>,
    pub last_updated: DateTime<Utc>,
}

impl CondensedStatus {
    pub fn new(reading: &Reading, assessment: &HealthAssessment, at: DateTime<Utc>) -> Self {
        Self {
            moisture: reading.soil_moisture(),
            health: assessment.health_score,
            light: reading.light_level(),
            temperature: reading.temperature(),
            humidity: reading.humidity(),
            status: assessment.status,
            battery: reading.battery_level(),
            last_updated: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_metrics_serialize_as_null() {
        let reading = Reading::from_json(
            br#"{"deviceId": "p1", "capturedAt": "2026-10-01T12:00:00Z",
                 "measurements": {"soilMoisture": 45}}"#,
        )
        .unwrap();
        let assessment = HealthAssessment {
            health_score: 100,
            status: HealthStatus::Healthy,
            issues: vec![],
        };

        let status = CondensedStatus::new(&reading, &assessment, reading.captured_at);
        let json = serde_json::to_value(&status).unwrap();

        assert_eq!(json["moisture"], 45.0);
        assert_eq!(json["health"], 100);
        assert_eq!(json["status"], "healthy");
        assert!(json["light"].is_null());
        assert!(json["battery"].is_null());
        assert_eq!(json["last_updated"], "2026-10-01T12:00:00Z");
    }
}
