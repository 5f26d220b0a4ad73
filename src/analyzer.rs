//! Health scoring for a single reading.
//!
//! Every check runs independently against the care profile and subtracts a
//! fixed penalty, so several issues can fire for one reading. The only
//! exclusive pair is moisture low / moisture high.
//!
//! Metrics the device did not report fall back to a neutral value that can
//! never trip its own check:
//!
//! | metric         | neutral value                                   |
//! |----------------|-------------------------------------------------|
//! | `soilMoisture` | midpoint of `moistureMin..=moistureMax`         |
//! | `lightLevel`   | the profile's light floor                       |
//! | `temperature`  | midpoint of the temperature band (or its bound) |
//! | `batteryLevel` | 100                                             |

use crate::model::{CareProfile, HealthAssessment, HealthStatus, Issue, IssueType, Reading};

pub const MAX_SCORE: i32 = 100;
pub const LOW_BATTERY_THRESHOLD: f64 = 20.0;
pub const FULL_BATTERY: f64 = 100.0;

/// Scores `reading` against `profile`. Pure: no clock, no I/O.
pub fn analyze(reading: &Reading, profile: &CareProfile) -> HealthAssessment {
    let mut issues = Vec::new();

    let moisture = reading
        .soil_moisture()
        .unwrap_or_else(|| profile.moisture_midpoint());
    if moisture < profile.moisture_min {
        issues.push(Issue::new(
            IssueType::WaterNeeded,
            format!(
                "Soil moisture too low: {}% (needs {}%+)",
                moisture, profile.moisture_min
            ),
        ));
    } else if moisture > profile.moisture_max {
        issues.push(Issue::new(
            IssueType::Overwatered,
            format!(
                "Soil moisture too high: {}% (max {}%)",
                moisture, profile.moisture_max
            ),
        ));
    }

    let light_floor = profile.light_floor();
    let light = reading.light_level().unwrap_or(light_floor);
    if light < light_floor {
        issues.push(Issue::new(
            IssueType::InsufficientLight,
            format!(
                "Light level too low: {} lux (needs {}+ lux)",
                light, light_floor
            ),
        ));
    }

    if let Some(neutral) = profile.temperature_midpoint() {
        let temperature = reading.temperature().unwrap_or(neutral);
        if profile.temperature_out_of_range(temperature) {
            issues.push(Issue::new(
                IssueType::TemperatureStress,
                format!(
                    "Temperature {}°C outside optimal range ({})",
                    temperature,
                    profile.temperature_range_label()
                ),
            ));
        }
    }

    let battery = reading.battery_level().unwrap_or(FULL_BATTERY);
    if battery < LOW_BATTERY_THRESHOLD {
        issues.push(Issue::new(
            IssueType::LowBattery,
            format!("Sensor battery low: {}%", battery),
        ));
    }

    let health_score = issues
        .iter()
        .fold(MAX_SCORE, |score, issue| score - issue.issue_type.penalty())
        .max(0);

    HealthAssessment {
        health_score,
        status: HealthStatus::from_score(health_score),
        issues,
    }
}
