use serde::{Deserialize, Serialize};

/// Light floor used when a profile does not set `lightMin`.
pub const DEFAULT_LIGHT_FLOOR: f64 = 200.0;

/// Care thresholds for one device. Provisioned externally; the pipeline only reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CareProfile {
    pub profile_id: String,
    pub device_id: String,
    pub moisture_min: f64,
    pub moisture_max: f64,
    #[serde(default)]
    pub light_min: Option<f64>,
    #[serde(default)]
    pub temp_min: Option<f64>,
    #[serde(default)]
    pub temp_max: Option<f64>,
}

impl CareProfile {
    pub fn moisture_midpoint(&self) -> f64 {
        (self.moisture_min + self.moisture_max) / 2.0
    }

    pub fn light_floor(&self) -> f64 {
        self.light_min.unwrap_or(DEFAULT_LIGHT_FLOOR)
    }

    /// Neutral temperature for readings without one, or `None` if the profile
    /// has no temperature band at all.
    pub fn temperature_midpoint(&self) -> Option<f64> {
        match (self.temp_min, self.temp_max) {
            (Some(min), Some(max)) => Some((min + max) / 2.0),
            (Some(bound), None) | (None, Some(bound)) => Some(bound),
            (None, None) => None,
        }
    }

    pub fn temperature_out_of_range(&self, temperature: f64) -> bool {
        self.temp_min.is_some_and(|min| temperature < min)
            || self.temp_max.is_some_and(|max| temperature > max)
    }

    pub fn temperature_range_label(&self) -> String {
        match (self.temp_min, self.temp_max) {
            (Some(min), Some(max)) => format!("{}-{}°C", min, max),
            (Some(min), None) => format!("{}°C+", min),
            (None, Some(max)) => format!("up to {}°C", max),
            (None, None) => "unbounded".to_string(),
        }
    }
}
