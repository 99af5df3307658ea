//! Alert rule evaluation engine
//!
//! The evaluator is a pure function of a reading, the threshold table, and a
//! caller-supplied snapshot of open alerts. It performs no I/O and holds no
//! mutable state, so one instance can be shared across any number of tasks.
//! Callers that persist decisions must serialize evaluate-then-persist per
//! sensor; see [`super::AlertMonitor`].

use chrono::SecondsFormat;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ThresholdConfig;
use crate::error::{EvaluationError, Result};
use crate::models::{
    Alert, AlertDecision, AlertKind, AlertStatus, Evaluation, ReadingPayload, ReadingStatus,
    SensorReading, SensorType,
};

use super::rules::{CheckRule, ThresholdRule, ThresholdTable};

/// Namespace for deterministic alert ids
const ALERT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6c61_6277_6174_6368_a1e7_0000_0000_0001);

/// Stateless alert evaluator
#[derive(Debug, Clone)]
pub struct AlertEvaluator {
    table: ThresholdTable,
}

impl AlertEvaluator {
    /// Create an evaluator, failing on an unusable threshold configuration
    pub fn new(config: &ThresholdConfig) -> Result<Self> {
        Ok(Self::from_table(ThresholdTable::from_config(config)?))
    }

    /// Create an evaluator from a prepared table
    pub fn from_table(table: ThresholdTable) -> Self {
        Self { table }
    }

    /// Threshold table in use
    pub fn table(&self) -> &ThresholdTable {
        &self.table
    }

    /// Evaluate one reading against the open alerts of its source.
    ///
    /// Alerts in `open_alerts` that belong to another sensor or are not open
    /// are ignored. Returns at most one decision per check kind; checks that
    /// cannot be evaluated are reported in `errors` without affecting others.
    pub fn evaluate(&self, reading: &SensorReading, open_alerts: &[Alert]) -> Evaluation {
        let checks = reading
            .sensor_type()
            .and_then(|t| self.table.checks_for(t).map(|checks| (t, checks)));

        let Some((sensor_type, checks)) = checks else {
            warn!(
                sensor_id = %reading.sensor_id,
                room_id = %reading.room_id,
                "No thresholds defined for sensor type, skipping reading"
            );
            return Evaluation {
                sensor_id: reading.sensor_id.clone(),
                status: ReadingStatus::Normal,
                decisions: Vec::new(),
                errors: vec![EvaluationError::UnknownSensorType {
                    sensor_id: reading.sensor_id.clone(),
                }],
            };
        };

        let mut status = ReadingStatus::Normal;
        let mut decisions = Vec::with_capacity(checks.len());
        let mut errors = Vec::new();

        for check in checks {
            let value = match self.metric_value(check.kind, &reading.payload) {
                Ok(value) => value,
                Err(e) => {
                    debug!(sensor_id = %reading.sensor_id, error = %e, "Check skipped");
                    errors.push(e);
                    continue;
                }
            };

            let level = check.classify(value);
            if let Some(level) = level {
                status = status.max(level.severity.into());
            }

            let open = current_open_alert(open_alerts, &reading.sensor_id, check.kind);
            let decision = decide(reading, sensor_type, check, value, level, open);

            debug!(
                sensor_id = %reading.sensor_id,
                kind = %check.kind,
                value,
                severity = ?level.map(|l| l.severity),
                action = decision.action(),
                "Evaluated check"
            );

            decisions.push(decision);
        }

        Evaluation {
            sensor_id: reading.sensor_id.clone(),
            status,
            decisions,
            errors,
        }
    }

    /// Extract the metric a check compares against its thresholds
    fn metric_value(
        &self,
        kind: AlertKind,
        payload: &ReadingPayload,
    ) -> std::result::Result<f64, EvaluationError> {
        match (kind, payload) {
            (AlertKind::Temperature, ReadingPayload::TempHumidity(r)) => {
                require(kind, r.temperature, "temperature")
            }
            (AlertKind::Humidity, ReadingPayload::TempHumidity(r)) => {
                require(kind, r.humidity, "humidity")
            }
            (AlertKind::Pm25, ReadingPayload::AirQuality(r)) => require(kind, r.pm25, "pm25"),
            (AlertKind::Pm10, ReadingPayload::AirQuality(r)) => require(kind, r.pm10, "pm10"),
            (AlertKind::Vibration, ReadingPayload::Vibration(r)) => {
                require(kind, r.rms_acceleration, "rmsAcceleration")
            }
            (AlertKind::ThermalHotspot, ReadingPayload::ThermalImager(r)) => r
                .summary()
                .map(|s| s.max)
                .map_err(|reason| EvaluationError::invalid(kind, reason)),
            (AlertKind::Occupancy, ReadingPayload::PeopleCount(r)) => {
                let count = require(kind, r.count, "count")?;
                if count < 0.0 || count.fract() != 0.0 {
                    return Err(EvaluationError::invalid(
                        kind,
                        format!("count must be a non-negative integer, got {count}"),
                    ));
                }

                let min = self.table.min_people_confidence;
                match r.confidence {
                    Some(confidence) if confidence < min => Err(EvaluationError::invalid(
                        kind,
                        format!("confidence {confidence} is below the minimum of {min}"),
                    )),
                    _ => Ok(count),
                }
            }
            _ => Err(EvaluationError::invalid(
                kind,
                "check does not apply to this sensor type",
            )),
        }
    }
}

fn require(
    kind: AlertKind,
    value: Option<f64>,
    field: &str,
) -> std::result::Result<f64, EvaluationError> {
    value.ok_or_else(|| EvaluationError::invalid(kind, format!("{field} is missing or not numeric")))
}

/// The open alert a check is compared against.
///
/// The store keeps at most one per (sensor, kind); if a snapshot still holds
/// several, the most severe and then most recent one wins.
fn current_open_alert<'a>(
    open_alerts: &'a [Alert],
    sensor_id: &str,
    kind: AlertKind,
) -> Option<&'a Alert> {
    let matching: Vec<&Alert> = open_alerts
        .iter()
        .filter(|a| a.status == AlertStatus::Open && a.kind == kind && a.sensor_id == sensor_id)
        .collect();

    if matching.len() > 1 {
        warn!(
            sensor_id,
            kind = %kind,
            count = matching.len(),
            "Multiple open alerts for one check"
        );
    }

    matching.into_iter().max_by(|a, b| {
        a.severity
            .cmp(&b.severity)
            .then(a.triggered_at.cmp(&b.triggered_at))
    })
}

fn decide(
    reading: &SensorReading,
    sensor_type: SensorType,
    check: &CheckRule,
    value: f64,
    level: Option<&ThresholdRule>,
    open: Option<&Alert>,
) -> AlertDecision {
    let kind = check.kind;

    match (level, open) {
        (None, None) => AlertDecision::NoAction { kind },
        (None, Some(alert)) => AlertDecision::Resolve {
            alert_id: alert.id,
            kind,
            resolved_at: reading.timestamp,
        },
        (Some(level), None) => AlertDecision::Raise(Alert {
            id: alert_id(reading, kind),
            room_id: reading.room_id.clone(),
            room_name: reading.room_name.clone(),
            sensor_id: reading.sensor_id.clone(),
            sensor_type,
            kind,
            severity: level.severity,
            message: format_alert_message(reading, kind, value, level),
            value,
            threshold: level.threshold,
            triggered_at: reading.timestamp,
            acknowledged_at: None,
            resolved_at: None,
            status: AlertStatus::Open,
        }),
        (Some(level), Some(alert)) if level.severity > alert.severity => AlertDecision::Escalate {
            alert_id: alert.id,
            kind,
            previous_severity: alert.severity,
            severity: level.severity,
            message: format_alert_message(reading, kind, value, level),
            value,
            threshold: level.threshold,
            triggered_at: reading.timestamp,
        },
        // No duplicates and no automatic downgrade while still abnormal
        (Some(_), Some(_)) => AlertDecision::NoAction { kind },
    }
}

/// Same sensor, kind and timestamp always map to the same id
fn alert_id(reading: &SensorReading, kind: AlertKind) -> Uuid {
    let name = format!(
        "{}/{}/{}",
        reading.sensor_id,
        kind,
        reading.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
    );
    Uuid::new_v5(&ALERT_ID_NAMESPACE, name.as_bytes())
}

fn format_alert_message(
    reading: &SensorReading,
    kind: AlertKind,
    value: f64,
    level: &ThresholdRule,
) -> String {
    let value = match kind {
        AlertKind::Occupancy => format!("{value:.0}"),
        AlertKind::Vibration => format!("{value:.2}"),
        _ => format!("{value:.1}"),
    };

    format!(
        "{} {}{} {} {} threshold of {}{} in {}",
        kind.metric_name(),
        value,
        kind.unit(),
        level.operator.verb(),
        level.severity,
        level.threshold,
        kind.unit(),
        reading.room_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AirQualityReading, PeopleCountReading, Severity, TempHumidityReading,
        ThermalImagerReading, VibrationReading,
    };
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn evaluator() -> AlertEvaluator {
        AlertEvaluator::new(&ThresholdConfig::default()).unwrap()
    }

    fn reading(payload: ReadingPayload) -> SensorReading {
        SensorReading {
            sensor_id: "sensor-1".to_string(),
            room_id: "room-a".to_string(),
            room_name: "Lab A".to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap(),
            status: ReadingStatus::Normal,
            payload,
        }
    }

    fn temp_humidity(temperature: f64, humidity: f64) -> SensorReading {
        reading(ReadingPayload::TempHumidity(TempHumidityReading {
            temperature: Some(temperature),
            humidity: Some(humidity),
        }))
    }

    fn open_alert(kind: AlertKind, severity: Severity) -> Alert {
        Alert {
            id: Uuid::new_v4(),
            room_id: "room-a".to_string(),
            room_name: "Lab A".to_string(),
            sensor_id: "sensor-1".to_string(),
            sensor_type: SensorType::TempHumidity,
            kind,
            severity,
            message: "existing".to_string(),
            value: 0.0,
            threshold: 0.0,
            triggered_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            acknowledged_at: None,
            resolved_at: None,
            status: AlertStatus::Open,
        }
    }

    #[test]
    fn test_high_temperature_raises_single_alert() {
        let result = evaluator().evaluate(&temp_humidity(32.0, 50.0), &[]);

        assert_eq!(result.status, ReadingStatus::Warning);
        assert!(result.errors.is_empty());
        assert_eq!(result.decisions.len(), 2);

        let AlertDecision::Raise(alert) = &result.decisions[0] else {
            panic!("expected raise, got {:?}", result.decisions[0]);
        };
        assert_eq!(alert.kind, AlertKind::Temperature);
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.threshold, 30.0);
        assert!(alert.message.contains("30°C"), "{}", alert.message);
        assert_eq!(
            alert.message,
            "Temperature 32.0°C reached high threshold of 30°C in Lab A"
        );

        assert_eq!(
            result.decisions[1],
            AlertDecision::NoAction {
                kind: AlertKind::Humidity
            }
        );
    }

    #[test]
    fn test_critical_temperature_and_humidity_raise_two_alerts() {
        let result = evaluator().evaluate(&temp_humidity(37.0, 85.0), &[]);

        assert_eq!(result.status, ReadingStatus::Critical);
        assert_eq!(result.decisions.len(), 2);
        for decision in &result.decisions {
            let AlertDecision::Raise(alert) = decision else {
                panic!("expected raise, got {decision:?}");
            };
            assert_eq!(alert.severity, Severity::Critical);
        }
    }

    #[test]
    fn test_return_to_normal_resolves_open_alert() {
        let existing = open_alert(AlertKind::Temperature, Severity::High);
        let result = evaluator().evaluate(&temp_humidity(25.0, 50.0), &[existing.clone()]);

        assert_eq!(result.status, ReadingStatus::Normal);
        assert_eq!(
            result.decisions,
            vec![
                AlertDecision::Resolve {
                    alert_id: existing.id,
                    kind: AlertKind::Temperature,
                    resolved_at: Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap(),
                },
                AlertDecision::NoAction {
                    kind: AlertKind::Humidity
                },
            ]
        );
    }

    #[test]
    fn test_escalates_instead_of_duplicating() {
        let existing = open_alert(AlertKind::Temperature, Severity::High);
        let result = evaluator().evaluate(&temp_humidity(36.0, 50.0), &[existing.clone()]);

        match result.decision_for(AlertKind::Temperature) {
            Some(AlertDecision::Escalate {
                alert_id,
                previous_severity,
                severity,
                threshold,
                ..
            }) => {
                assert_eq!(*alert_id, existing.id);
                assert_eq!(*previous_severity, Severity::High);
                assert_eq!(*severity, Severity::Critical);
                assert_eq!(*threshold, 35.0);
            }
            other => panic!("expected escalate, got {other:?}"),
        }
    }

    #[test]
    fn test_same_severity_is_no_action() {
        let existing = open_alert(AlertKind::Temperature, Severity::High);
        let result = evaluator().evaluate(&temp_humidity(31.0, 50.0), &[existing]);

        assert_eq!(
            result.decision_for(AlertKind::Temperature),
            Some(&AlertDecision::NoAction {
                kind: AlertKind::Temperature
            })
        );
    }

    #[test]
    fn test_no_automatic_downgrade() {
        let existing = open_alert(AlertKind::Temperature, Severity::Critical);
        let result = evaluator().evaluate(&temp_humidity(31.0, 50.0), &[existing]);

        assert_eq!(result.status, ReadingStatus::Warning);
        assert_eq!(
            result.decision_for(AlertKind::Temperature),
            Some(&AlertDecision::NoAction {
                kind: AlertKind::Temperature
            })
        );
    }

    #[test]
    fn test_ignores_alerts_of_other_sources_and_closed_alerts() {
        let mut other_sensor = open_alert(AlertKind::Temperature, Severity::High);
        other_sensor.sensor_id = "sensor-2".to_string();
        let mut acknowledged = open_alert(AlertKind::Temperature, Severity::High);
        acknowledged.status = AlertStatus::Acknowledged;
        let humidity = open_alert(AlertKind::Humidity, Severity::High);

        let result = evaluator().evaluate(
            &temp_humidity(32.0, 75.0),
            &[other_sensor, acknowledged, humidity],
        );

        assert!(matches!(
            result.decision_for(AlertKind::Temperature),
            Some(AlertDecision::Raise(_))
        ));
        assert_eq!(
            result.decision_for(AlertKind::Humidity),
            Some(&AlertDecision::NoAction {
                kind: AlertKind::Humidity
            })
        );
    }

    #[test]
    fn test_duplicate_open_alerts_resolve_most_severe() {
        let high = open_alert(AlertKind::Temperature, Severity::High);
        let critical = open_alert(AlertKind::Temperature, Severity::Critical);

        let result = evaluator().evaluate(&temp_humidity(20.0, 40.0), &[high, critical.clone()]);

        let resolves: Vec<_> = result
            .decisions
            .iter()
            .filter(|d| matches!(d, AlertDecision::Resolve { .. }))
            .collect();
        assert_eq!(resolves.len(), 1);
        assert!(matches!(
            resolves[0],
            AlertDecision::Resolve { alert_id, .. } if *alert_id == critical.id
        ));
    }

    #[test]
    fn test_missing_field_fails_only_that_check() {
        let reading = reading(ReadingPayload::TempHumidity(TempHumidityReading {
            temperature: None,
            humidity: Some(82.0),
        }));
        let result = evaluator().evaluate(&reading, &[]);

        assert_eq!(result.decisions.len(), 1);
        assert!(matches!(
            &result.decisions[0],
            AlertDecision::Raise(alert) if alert.kind == AlertKind::Humidity
        ));
        assert_eq!(
            result.errors,
            vec![EvaluationError::InvalidReading {
                kind: AlertKind::Temperature,
                reason: "temperature is missing or not numeric".to_string(),
            }]
        );
    }

    #[test]
    fn test_unknown_sensor_type_yields_no_decisions() {
        let result = evaluator().evaluate(&reading(ReadingPayload::Unknown), &[]);

        assert!(result.decisions.is_empty());
        assert_eq!(result.status, ReadingStatus::Normal);
        assert_eq!(
            result.errors,
            vec![EvaluationError::UnknownSensorType {
                sensor_id: "sensor-1".to_string()
            }]
        );
    }

    #[test]
    fn test_air_quality_checks() {
        let reading = reading(ReadingPayload::AirQuality(AirQualityReading {
            pm25: Some(60.0),
            pm10: Some(160.0),
            ..Default::default()
        }));
        let result = evaluator().evaluate(&reading, &[]);

        let severities: Vec<(AlertKind, Severity)> = result
            .decisions
            .iter()
            .filter_map(|d| match d {
                AlertDecision::Raise(a) => Some((a.kind, a.severity)),
                _ => None,
            })
            .collect();
        assert_eq!(
            severities,
            vec![
                (AlertKind::Pm25, Severity::Critical),
                (AlertKind::Pm10, Severity::High)
            ]
        );
    }

    #[test]
    fn test_vibration_and_thermal_checks() {
        let vibration = reading(ReadingPayload::Vibration(VibrationReading {
            rms_acceleration: Some(0.2),
        }));
        assert_eq!(evaluator().evaluate(&vibration, &[]).status, ReadingStatus::Normal);

        let mut rows = vec![vec![24.0; 8]; 8];
        rows[2][5] = 61.5;
        let thermal = reading(ReadingPayload::ThermalImager(ThermalImagerReading {
            pixels: Some(serde_json::json!(rows)),
            ..Default::default()
        }));
        let result = evaluator().evaluate(&thermal, &[]);
        assert!(matches!(
            result.decision_for(AlertKind::ThermalHotspot),
            Some(AlertDecision::Raise(a)) if a.severity == Severity::Critical && a.value == 61.5
        ));

        let malformed = reading(ReadingPayload::ThermalImager(ThermalImagerReading {
            pixels: Some(serde_json::json!(vec![24.0; 10])),
            ..Default::default()
        }));
        let result = evaluator().evaluate(&malformed, &[]);
        assert!(result.decisions.is_empty());
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_null_pixel_fails_hotspot_check_only() {
        let mut rows = vec![vec![serde_json::json!(24.0); 8]; 8];
        rows[0][1] = serde_json::Value::Null;
        let thermal: SensorReading = serde_json::from_value(serde_json::json!({
            "sensorId": "ti-1",
            "roomId": "room-a",
            "roomName": "Lab A",
            "timestamp": "2026-03-01T10:00:00Z",
            "sensorType": "thermalImager",
            "pixels": rows
        }))
        .unwrap();

        let result = evaluator().evaluate(&thermal, &[]);
        assert!(result.decisions.is_empty());
        assert!(matches!(
            result.errors.as_slice(),
            [EvaluationError::InvalidReading { kind: AlertKind::ThermalHotspot, .. }]
        ));
    }

    #[test]
    fn test_float_aqi_keeps_particulate_checks() {
        let air: SensorReading = serde_json::from_value(serde_json::json!({
            "sensorId": "aq-1",
            "roomId": "room-a",
            "roomName": "Lab A",
            "timestamp": "2026-03-01T10:00:00Z",
            "sensorType": "airQuality",
            "pm25": 60,
            "pm10": 20,
            "aqi": 153.7
        }))
        .unwrap();

        let result = evaluator().evaluate(&air, &[]);
        assert!(result.errors.is_empty());
        assert_eq!(result.status, ReadingStatus::Critical);
        assert!(matches!(
            result.decision_for(AlertKind::Pm25),
            Some(AlertDecision::Raise(a)) if a.severity == Severity::Critical
        ));
        assert!(matches!(
            result.decision_for(AlertKind::Pm10),
            Some(AlertDecision::NoAction { .. })
        ));
    }

    #[test]
    fn test_people_count_confidence_gate() {
        let confident = reading(ReadingPayload::PeopleCount(PeopleCountReading {
            count: Some(16.0),
            confidence: Some(0.9),
        }));
        let result = evaluator().evaluate(&confident, &[]);
        assert!(matches!(
            result.decision_for(AlertKind::Occupancy),
            Some(AlertDecision::Raise(a)) if a.message == "Occupancy 16 people reached high threshold of 15 people in Lab A"
        ));

        let unsure = reading(ReadingPayload::PeopleCount(PeopleCountReading {
            count: Some(30.0),
            confidence: Some(0.2),
        }));
        let result = evaluator().evaluate(&unsure, &[]);
        assert!(result.decisions.is_empty());
        assert!(matches!(
            &result.errors[0],
            EvaluationError::InvalidReading { kind: AlertKind::Occupancy, .. }
        ));

        let fractional = reading(ReadingPayload::PeopleCount(PeopleCountReading {
            count: Some(2.5),
            confidence: None,
        }));
        assert_eq!(evaluator().evaluate(&fractional, &[]).errors.len(), 1);
    }

    #[test]
    fn test_raise_is_deterministic() {
        let evaluator = evaluator();
        let reading = temp_humidity(33.0, 72.0);

        let first = evaluator.evaluate(&reading, &[]);
        let second = evaluator.evaluate(&reading, &[]);
        assert_eq!(first, second);

        let AlertDecision::Raise(temperature) = &first.decisions[0] else {
            panic!("expected raise");
        };
        let AlertDecision::Raise(humidity) = &first.decisions[1] else {
            panic!("expected raise");
        };
        assert_ne!(temperature.id, humidity.id);
    }
}
