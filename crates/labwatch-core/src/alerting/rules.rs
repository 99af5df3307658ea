//! Threshold tables: sensor type -> checks -> ordered severity levels

use serde::Serialize;
use std::collections::HashMap;

use crate::config::ThresholdConfig;
use crate::error::{Error, Result};
use crate::models::{AlertKind, Operator, SensorType, Severity};

/// One severity level of a check
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdRule {
    pub severity: Severity,
    pub operator: Operator,
    pub threshold: f64,
}

impl ThresholdRule {
    /// `value >= threshold` rule
    pub fn at_least(severity: Severity, threshold: f64) -> Self {
        Self {
            severity,
            operator: Operator::Gte,
            threshold,
        }
    }

    /// Whether a value triggers this level
    pub fn check(&self, value: f64) -> bool {
        self.operator.matches(value, self.threshold)
    }
}

/// Levels for one check kind, most severe first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckRule {
    pub kind: AlertKind,
    levels: Vec<ThresholdRule>,
}

impl CheckRule {
    /// Build a check, ordering levels from most to least severe.
    ///
    /// Levels must be distinct in severity, share one operator direction,
    /// and be nested so that every value triggering a more severe level also
    /// triggers the less severe ones.
    pub fn new(kind: AlertKind, mut levels: Vec<ThresholdRule>) -> Result<Self> {
        if levels.is_empty() {
            return Err(Error::config(format!("{kind} check has no threshold levels")));
        }

        levels.sort_by(|a, b| b.severity.cmp(&a.severity));

        for level in &levels {
            if !level.threshold.is_finite() {
                return Err(Error::config(format!(
                    "{kind} {} threshold must be finite",
                    level.severity
                )));
            }
        }

        for pair in levels.windows(2) {
            let (upper, lower) = (pair[0], pair[1]);

            if upper.severity == lower.severity {
                return Err(Error::config(format!(
                    "{kind} check defines the {} level twice",
                    upper.severity
                )));
            }

            let nested = match (upper.operator, lower.operator) {
                (Operator::Gt | Operator::Gte, Operator::Gt | Operator::Gte) => {
                    upper.threshold > lower.threshold
                }
                (Operator::Lt | Operator::Lte, Operator::Lt | Operator::Lte) => {
                    upper.threshold < lower.threshold
                }
                _ => false,
            };

            if !nested {
                return Err(Error::config(format!(
                    "{kind} {} threshold ({}) must be stricter than its {} threshold ({})",
                    upper.severity, upper.threshold, lower.severity, lower.threshold
                )));
            }
        }

        Ok(Self { kind, levels })
    }

    /// Levels, most severe first
    pub fn levels(&self) -> &[ThresholdRule] {
        &self.levels
    }

    /// First level the value triggers, scanning from most severe
    pub fn classify(&self, value: f64) -> Option<&ThresholdRule> {
        self.levels.iter().find(|level| level.check(value))
    }
}

/// Checks for every sensor type.
///
/// Built once at startup; a configuration that cannot produce a valid table
/// is rejected before any reading is evaluated.
#[derive(Debug, Clone, Serialize)]
pub struct ThresholdTable {
    checks: HashMap<SensorType, Vec<CheckRule>>,
    /// People counts below this confidence are not evaluated
    pub min_people_confidence: f64,
}

impl ThresholdTable {
    /// Build the table from configuration
    pub fn from_config(config: &ThresholdConfig) -> Result<Self> {
        let pair = |kind: AlertKind, high: f64, critical: f64| {
            CheckRule::new(
                kind,
                vec![
                    ThresholdRule::at_least(Severity::Critical, critical),
                    ThresholdRule::at_least(Severity::High, high),
                ],
            )
        };

        if !(0.0..=1.0).contains(&config.min_people_confidence) {
            return Err(Error::config(format!(
                "min_people_confidence must be within [0, 1], got {}",
                config.min_people_confidence
            )));
        }

        let mut checks = HashMap::new();
        checks.insert(
            SensorType::TempHumidity,
            vec![
                pair(AlertKind::Temperature, config.high_temp, config.critical_temp)?,
                pair(AlertKind::Humidity, config.high_humidity, config.critical_humidity)?,
            ],
        );
        checks.insert(
            SensorType::AirQuality,
            vec![
                pair(AlertKind::Pm25, config.high_pm25, config.critical_pm25)?,
                pair(AlertKind::Pm10, config.high_pm10, config.critical_pm10)?,
            ],
        );
        checks.insert(
            SensorType::Vibration,
            vec![pair(
                AlertKind::Vibration,
                config.high_vibration,
                config.critical_vibration,
            )?],
        );
        checks.insert(
            SensorType::ThermalImager,
            vec![pair(
                AlertKind::ThermalHotspot,
                config.high_thermal_max,
                config.critical_thermal_max,
            )?],
        );
        checks.insert(
            SensorType::PeopleCount,
            vec![pair(
                AlertKind::Occupancy,
                f64::from(config.high_occupancy),
                f64::from(config.critical_occupancy),
            )?],
        );

        Ok(Self {
            checks,
            min_people_confidence: config.min_people_confidence,
        })
    }

    /// Checks for a sensor type, `None` when the type has no table
    pub fn checks_for(&self, sensor_type: SensorType) -> Option<&[CheckRule]> {
        self.checks.get(&sensor_type).map(Vec::as_slice)
    }

    /// All checks, in a stable sensor-type order
    pub fn iter(&self) -> impl Iterator<Item = (SensorType, &[CheckRule])> + '_ {
        SensorType::ALL
            .into_iter()
            .filter_map(move |t| self.checks_for(t).map(|checks| (t, checks)))
    }
}
