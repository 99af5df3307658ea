//! Evaluator properties over generated readings

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use rstest::rstest;

use labwatch::alerting::AlertEvaluator;
use labwatch::config::ThresholdConfig;
use labwatch::models::{
    Alert, AlertDecision, AlertKind, AlertStatus, ReadingPayload, ReadingStatus, SensorReading,
    SensorType, Severity, TempHumidityReading,
};

fn evaluator() -> AlertEvaluator {
    AlertEvaluator::new(&ThresholdConfig::default()).unwrap()
}

fn temp_humidity(temperature: f64, humidity: f64) -> SensorReading {
    SensorReading {
        sensor_id: "th-1".to_string(),
        room_id: "room-a".to_string(),
        room_name: "Lab A".to_string(),
        timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap(),
        status: ReadingStatus::Normal,
        payload: ReadingPayload::TempHumidity(TempHumidityReading {
            temperature: Some(temperature),
            humidity: Some(humidity),
        }),
    }
}

fn open_temperature_alert(severity: Severity) -> Alert {
    Alert {
        id: uuid::Uuid::new_v4(),
        room_id: "room-a".to_string(),
        room_name: "Lab A".to_string(),
        sensor_id: "th-1".to_string(),
        sensor_type: SensorType::TempHumidity,
        kind: AlertKind::Temperature,
        severity,
        message: "Temperature 31.0°C reached high threshold of 30°C in Lab A".to_string(),
        value: 31.0,
        threshold: 30.0,
        triggered_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        acknowledged_at: None,
        resolved_at: None,
        status: AlertStatus::Open,
    }
}

#[rstest]
#[case(29.9, ReadingStatus::Normal, None)]
#[case(30.0, ReadingStatus::Warning, Some(Severity::High))]
#[case(34.9, ReadingStatus::Warning, Some(Severity::High))]
#[case(35.0, ReadingStatus::Critical, Some(Severity::Critical))]
#[case(50.0, ReadingStatus::Critical, Some(Severity::Critical))]
fn temperature_boundaries(
    #[case] temperature: f64,
    #[case] status: ReadingStatus,
    #[case] raised: Option<Severity>,
) {
    let evaluation = evaluator().evaluate(&temp_humidity(temperature, 50.0), &[]);

    assert_eq!(evaluation.status, status);
    let severity = match evaluation.decision_for(AlertKind::Temperature) {
        Some(AlertDecision::Raise(alert)) => Some(alert.severity),
        _ => None,
    };
    assert_eq!(severity, raised);
}

proptest! {
    #[test]
    fn below_high_is_no_action(temperature in -20.0f64..30.0, humidity in 0.0f64..70.0) {
        let evaluation = evaluator().evaluate(&temp_humidity(temperature, humidity), &[]);

        prop_assert_eq!(evaluation.status, ReadingStatus::Normal);
        prop_assert!(evaluation
            .decisions
            .iter()
            .all(|d| matches!(d, AlertDecision::NoAction { .. })), "expected only NoAction decisions");
    }

    #[test]
    fn critical_values_never_raise_high(temperature in 35.0f64..120.0) {
        let evaluation = evaluator().evaluate(&temp_humidity(temperature, 50.0), &[]);

        match evaluation.decision_for(AlertKind::Temperature) {
            Some(AlertDecision::Raise(alert)) => prop_assert_eq!(alert.severity, Severity::Critical),
            other => prop_assert!(false, "expected raise, got {:?}", other),
        }
    }

    #[test]
    fn evaluation_is_idempotent(temperature in -20.0f64..120.0, humidity in 0.0f64..100.0) {
        let evaluator = evaluator();
        let reading = temp_humidity(temperature, humidity);
        let open = vec![open_temperature_alert(Severity::High)];

        prop_assert_eq!(evaluator.evaluate(&reading, &open), evaluator.evaluate(&reading, &open));
    }

    #[test]
    fn open_high_escalates_on_critical(temperature in 35.0f64..120.0) {
        let open = open_temperature_alert(Severity::High);
        let evaluation = evaluator().evaluate(&temp_humidity(temperature, 50.0), &[open.clone()]);

        match evaluation.decision_for(AlertKind::Temperature) {
            Some(AlertDecision::Escalate { alert_id, severity, .. }) => {
                prop_assert_eq!(*alert_id, open.id);
                prop_assert_eq!(*severity, Severity::Critical);
            }
            other => prop_assert!(false, "expected escalate, got {:?}", other),
        }
    }

    #[test]
    fn open_alert_resolves_on_normal(temperature in -20.0f64..30.0, severity in prop_oneof![Just(Severity::High), Just(Severity::Critical)]) {
        let open = open_temperature_alert(severity);
        let evaluation = evaluator().evaluate(&temp_humidity(temperature, 50.0), &[open.clone()]);

        match evaluation.decision_for(AlertKind::Temperature) {
            Some(AlertDecision::Resolve { alert_id, .. }) => prop_assert_eq!(*alert_id, open.id),
            other => prop_assert!(false, "expected resolve, got {:?}", other),
        }
    }
}
