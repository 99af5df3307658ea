//! Alert data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::reading::{ReadingStatus, SensorType};

/// One dimension of anomaly evaluation derived from a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AlertKind {
    /// Air temperature
    Temperature,
    /// Relative humidity
    Humidity,
    /// PM2.5 concentration
    Pm25,
    /// PM10 concentration
    Pm10,
    /// Equipment vibration
    Vibration,
    /// Hottest cell of a thermal frame
    ThermalHotspot,
    /// Number of people in the room
    Occupancy,
}

impl AlertKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Temperature => "temperature",
            AlertKind::Humidity => "humidity",
            AlertKind::Pm25 => "pm25",
            AlertKind::Pm10 => "pm10",
            AlertKind::Vibration => "vibration",
            AlertKind::ThermalHotspot => "thermalHotspot",
            AlertKind::Occupancy => "occupancy",
        }
    }

    /// Metric name used in alert messages
    pub fn metric_name(&self) -> &'static str {
        match self {
            AlertKind::Temperature => "Temperature",
            AlertKind::Humidity => "Humidity",
            AlertKind::Pm25 => "PM2.5",
            AlertKind::Pm10 => "PM10",
            AlertKind::Vibration => "Vibration",
            AlertKind::ThermalHotspot => "Hotspot temperature",
            AlertKind::Occupancy => "Occupancy",
        }
    }

    /// Unit suffix appended to values in alert messages
    pub fn unit(&self) -> &'static str {
        match self {
            AlertKind::Temperature | AlertKind::ThermalHotspot => "°C",
            AlertKind::Humidity => "%",
            AlertKind::Pm25 | AlertKind::Pm10 => " µg/m³",
            AlertKind::Vibration => " g",
            AlertKind::Occupancy => " people",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Alert severity level, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Above the high threshold
    High,
    /// Above the critical threshold
    Critical,
}

impl Severity {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl From<Severity> for ReadingStatus {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::High => ReadingStatus::Warning,
            Severity::Critical => ReadingStatus::Critical,
        }
    }
}

/// Status of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    /// Alert is open and unacknowledged
    #[default]
    Open,
    /// An operator has acknowledged the alert
    Acknowledged,
    /// Alert has been resolved
    Resolved,
}

impl AlertStatus {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Open => "open",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    /// Greater than
    Gt,
    /// Greater than or equal to
    Gte,
    /// Less than
    Lt,
    /// Less than or equal to
    Lte,
}

impl Operator {
    /// Whether `value` satisfies the comparison against `threshold`
    pub fn matches(&self, value: f64, threshold: f64) -> bool {
        match self {
            Operator::Gt => value > threshold,
            Operator::Gte => value >= threshold,
            Operator::Lt => value < threshold,
            Operator::Lte => value <= threshold,
        }
    }

    /// Comparison symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
        }
    }

    /// Verb used in alert messages
    pub fn verb(&self) -> &'static str {
        match self {
            Operator::Gt => "exceeded",
            Operator::Gte => "reached",
            Operator::Lt => "fell below",
            Operator::Lte => "fell to",
        }
    }
}

/// An alert record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Unique identifier
    pub id: Uuid,

    /// Room the source sensor is installed in
    pub room_id: String,

    /// Human-readable room name
    pub room_name: String,

    /// Source sensor
    pub sensor_id: String,

    /// Type of the source sensor
    pub sensor_type: SensorType,

    /// Check that raised the alert
    pub kind: AlertKind,

    /// Current severity
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Metric value of the reading that last triggered the alert
    pub value: f64,

    /// Threshold that was crossed
    pub threshold: f64,

    /// When the alert was raised, or last escalated
    pub triggered_at: DateTime<Utc>,

    /// When an operator acknowledged the alert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,

    /// When the alert was resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,

    /// Current status
    #[serde(default)]
    pub status: AlertStatus,
}

impl Alert {
    /// Whether the alert is still open
    pub fn is_open(&self) -> bool {
        self.status == AlertStatus::Open
    }
}
