//! Alert repository for storing and querying alerts

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Alert, AlertKind, AlertStatus, Severity};

/// Fields written when an open alert is escalated
#[derive(Debug, Clone, PartialEq)]
pub struct EscalationUpdate {
    pub severity: Severity,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
    pub triggered_at: DateTime<Utc>,
}

/// Filter for listing alerts
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertQuery {
    pub status: Option<AlertStatus>,
    pub room_id: Option<String>,
    pub sensor_id: Option<String>,
    pub limit: Option<usize>,
}

impl AlertQuery {
    fn matches(&self, alert: &Alert) -> bool {
        self.status.map_or(true, |s| alert.status == s)
            && self.room_id.as_deref().map_or(true, |r| alert.room_id == r)
            && self.sensor_id.as_deref().map_or(true, |s| alert.sensor_id == s)
    }
}

/// Persistence for alert records.
///
/// Implementations must keep at most one `open` alert per (sensor, kind):
/// `create` rejects a second one with [`Error::Conflict`].
#[async_trait]
pub trait AlertRepository: Send + Sync {
    /// Store a newly raised alert
    async fn create(&self, alert: &Alert) -> Result<()>;

    /// Raise the severity of an open alert in place
    async fn escalate(&self, id: Uuid, update: EscalationUpdate) -> Result<Alert>;

    /// Close an open or acknowledged alert
    async fn resolve(&self, id: Uuid, at: DateTime<Utc>) -> Result<Alert>;

    /// Mark an open alert as seen by an operator
    async fn acknowledge(&self, id: Uuid, at: DateTime<Utc>) -> Result<Alert>;

    /// Open alerts of one sensor
    async fn open_for_sensor(&self, sensor_id: &str) -> Result<Vec<Alert>>;

    /// Get an alert by ID
    async fn get(&self, id: Uuid) -> Result<Option<Alert>>;

    /// List alerts matching a query, newest first
    async fn list(&self, query: &AlertQuery) -> Result<Vec<Alert>>;
}

/// Process-local repository
#[derive(Debug, Default)]
pub struct InMemoryAlertRepository {
    alerts: RwLock<HashMap<Uuid, Alert>>,
}

impl InMemoryAlertRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored alerts in any status
    pub fn len(&self) -> usize {
        self.alerts.read().len()
    }

    /// Whether the repository holds no alerts
    pub fn is_empty(&self) -> bool {
        self.alerts.read().is_empty()
    }

    fn update<F>(&self, id: Uuid, apply: F) -> Result<Alert>
    where
        F: FnOnce(&mut Alert) -> Result<()>,
    {
        let mut alerts = self.alerts.write();
        let alert = alerts
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("Alert", id.to_string()))?;
        apply(alert)?;
        Ok(alert.clone())
    }
}

fn find_open<'a>(
    alerts: &'a HashMap<Uuid, Alert>,
    sensor_id: &str,
    kind: AlertKind,
) -> Option<&'a Alert> {
    alerts
        .values()
        .find(|a| a.is_open() && a.sensor_id == sensor_id && a.kind == kind)
}

#[async_trait]
impl AlertRepository for InMemoryAlertRepository {
    async fn create(&self, alert: &Alert) -> Result<()> {
        let mut alerts = self.alerts.write();

        if alerts.contains_key(&alert.id) {
            return Err(Error::Conflict(format!("alert {} already exists", alert.id)));
        }

        if alert.is_open() {
            if let Some(existing) = find_open(&alerts, &alert.sensor_id, alert.kind) {
                return Err(Error::Conflict(format!(
                    "sensor {} already has open {} alert {}",
                    alert.sensor_id, alert.kind, existing.id
                )));
            }
        }

        alerts.insert(alert.id, alert.clone());
        Ok(())
    }

    async fn escalate(&self, id: Uuid, update: EscalationUpdate) -> Result<Alert> {
        self.update(id, |alert| {
            if !alert.is_open() {
                return Err(Error::InvalidTransition(format!(
                    "cannot escalate {} alert {id}",
                    alert.status.as_str()
                )));
            }
            if update.severity <= alert.severity {
                return Err(Error::InvalidTransition(format!(
                    "alert {id} is already {}",
                    alert.severity
                )));
            }

            alert.severity = update.severity;
            alert.message = update.message;
            alert.value = update.value;
            alert.threshold = update.threshold;
            alert.triggered_at = update.triggered_at;
            Ok(())
        })
    }

    async fn resolve(&self, id: Uuid, at: DateTime<Utc>) -> Result<Alert> {
        self.update(id, |alert| {
            if alert.status == AlertStatus::Resolved {
                return Err(Error::InvalidTransition(format!(
                    "alert {id} is already resolved"
                )));
            }

            alert.status = AlertStatus::Resolved;
            alert.resolved_at = Some(at);
            Ok(())
        })
    }

    async fn acknowledge(&self, id: Uuid, at: DateTime<Utc>) -> Result<Alert> {
        self.update(id, |alert| {
            if !alert.is_open() {
                return Err(Error::InvalidTransition(format!(
                    "cannot acknowledge {} alert {id}",
                    alert.status.as_str()
                )));
            }

            alert.status = AlertStatus::Acknowledged;
            alert.acknowledged_at = Some(at);
            Ok(())
        })
    }

    async fn open_for_sensor(&self, sensor_id: &str) -> Result<Vec<Alert>> {
        Ok(self
            .alerts
            .read()
            .values()
            .filter(|a| a.is_open() && a.sensor_id == sensor_id)
            .cloned()
            .collect())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Alert>> {
        Ok(self.alerts.read().get(&id).cloned())
    }

    async fn list(&self, query: &AlertQuery) -> Result<Vec<Alert>> {
        let mut alerts: Vec<Alert> = self
            .alerts
            .read()
            .values()
            .filter(|a| query.matches(a))
            .cloned()
            .collect();

        alerts.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at));
        if let Some(limit) = query.limit {
            alerts.truncate(limit);
        }

        Ok(alerts)
    }
}
