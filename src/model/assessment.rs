use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueType {
    WaterNeeded,
    Overwatered,
    InsufficientLight,
    TemperatureStress,
    LowBattery,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::WaterNeeded => "WATER_NEEDED",
            IssueType::Overwatered => "OVERWATERED",
            IssueType::InsufficientLight => "INSUFFICIENT_LIGHT",
            IssueType::TemperatureStress => "TEMPERATURE_STRESS",
            IssueType::LowBattery => "LOW_BATTERY",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            IssueType::WaterNeeded => Severity::High,
            IssueType::Overwatered | IssueType::InsufficientLight => Severity::Medium,
            IssueType::TemperatureStress | IssueType::LowBattery => Severity::Low,
        }
    }

    /// Points subtracted from the health score when this issue fires.
    pub fn penalty(&self) -> i32 {
        match self {
            IssueType::WaterNeeded => 30,
            IssueType::Overwatered => 20,
            IssueType::InsufficientLight => 15,
            IssueType::TemperatureStress => 10,
            IssueType::LowBattery => 5,
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    NeedsAttention,
    Critical,
}

impl HealthStatus {
    /// `healthy` needs strictly more than 80 points, `needs_attention` strictly more than 60.
    pub fn from_score(score: i32) -> Self {
        if score > 80 {
            HealthStatus::Healthy
        } else if score > 60 {
            HealthStatus::NeedsAttention
        } else {
            HealthStatus::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::NeedsAttention => "needs_attention",
            HealthStatus::Critical => "critical",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub severity: Severity,
    pub message: String,
}

impl Issue {
    pub fn new(issue_type: IssueType, message: impl Into<String>) -> Self {
        Self {
            issue_type,
            severity: issue_type.severity(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthAssessment {
    pub health_score: i32,
    pub status: HealthStatus,
    pub issues: Vec<Issue>,
}

/// An issue as persisted and republished for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: Uuid,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub alert_type: IssueType,
    pub severity: Severity,
    pub message: String,
}

impl Alert {
    pub fn from_issue(device_id: &str, issue: &Issue, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id: device_id.to_string(),
            timestamp,
            alert_type: issue.issue_type,
            severity: issue.severity,
            message: issue.message.clone(),
        }
    }
}
