//! Applies evaluator decisions to the alert repository.
//!
//! The evaluator itself is pure; this is the caller that owns the
//! check-then-act race on open alerts. Every reading takes a per-sensor lock
//! for the whole fetch/evaluate/persist sequence, so two readings of the same
//! sensor can never both raise. A lock entry is dropped as soon as no task
//! holds or waits on it.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::AlertingConfig;
use crate::error::{Error, Result};
use crate::models::{Alert, AlertDecision, Evaluation, ReadingStatus, SensorReading};

use super::evaluator::AlertEvaluator;
use super::notifier::{NotificationEvent, NotificationSender};
use super::repository::{AlertRepository, EscalationUpdate};

/// Evaluates readings and persists the resulting alert changes
pub struct AlertMonitor {
    evaluator: Arc<AlertEvaluator>,
    repository: Arc<dyn AlertRepository>,
    notifier: Option<NotificationSender>,
    config: AlertingConfig,
    source_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AlertMonitor {
    /// Create a monitor without notifications
    pub fn new(evaluator: Arc<AlertEvaluator>, repository: Arc<dyn AlertRepository>) -> Self {
        Self {
            evaluator,
            repository,
            notifier: None,
            config: AlertingConfig::default(),
            source_locks: DashMap::new(),
        }
    }

    /// Attach a notification sender
    pub fn with_notifier(mut self, notifier: NotificationSender) -> Self {
        self.notifier = Some(notifier).filter(NotificationSender::has_channels);
        self
    }

    /// Override alerting behaviour
    pub fn with_config(mut self, config: AlertingConfig) -> Self {
        self.config = config;
        self
    }

    /// The evaluator in use
    pub fn evaluator(&self) -> &AlertEvaluator {
        &self.evaluator
    }

    /// The repository in use
    pub fn repository(&self) -> &Arc<dyn AlertRepository> {
        &self.repository
    }

    fn source_lock(&self, sensor_id: &str) -> Arc<Mutex<()>> {
        self.source_locks
            .entry(sensor_id.to_string())
            .or_default()
            .clone()
    }

    /// Drop the lock entry once no task holds or waits on it
    fn release_source_lock(&self, sensor_id: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.source_locks
            .remove_if(sensor_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Sensors with a live lock entry
    pub fn tracked_sources(&self) -> usize {
        self.source_locks.len()
    }

    /// Evaluate a reading and persist the resulting decisions.
    ///
    /// Every decision is applied even if an earlier one fails; the first
    /// repository failure is returned afterwards. A raise whose alert id is
    /// already stored is a redelivered reading and is skipped. Notification
    /// failures are only logged.
    pub async fn process(&self, reading: &SensorReading) -> Result<Evaluation> {
        validate_source(reading)?;

        let lock = self.source_lock(&reading.sensor_id);
        let result = {
            let _guard = lock.lock().await;
            self.process_locked(reading).await
        };
        self.release_source_lock(&reading.sensor_id, lock);

        result
    }

    async fn process_locked(&self, reading: &SensorReading) -> Result<Evaluation> {
        let open_alerts = self.repository.open_for_sensor(&reading.sensor_id).await?;
        let evaluation = self.evaluator.evaluate(reading, &open_alerts);

        metrics::counter!("labwatch_readings_total", "status" => status_label(&evaluation))
            .increment(1);
        for error in &evaluation.errors {
            warn!(sensor_id = %reading.sensor_id, error = %error, "Reading check failed");
            metrics::counter!(
                "labwatch_invalid_checks_total",
                "kind" => error.kind().map_or("unknown", |k| k.as_str())
            )
            .increment(1);
        }

        let mut failure = None;
        for decision in evaluation.actionable() {
            metrics::counter!(
                "labwatch_alert_decisions_total",
                "action" => decision.action(),
                "kind" => decision.kind().as_str()
            )
            .increment(1);

            if let Err(e) = self.apply(decision).await {
                error!(
                    sensor_id = %reading.sensor_id,
                    action = decision.action(),
                    kind = %decision.kind(),
                    error = %e,
                    "Failed to apply alert decision"
                );
                failure.get_or_insert(e);
            }
        }

        debug!(
            sensor_id = %reading.sensor_id,
            status = ?evaluation.status,
            decisions = evaluation.decisions.len(),
            "Processed reading"
        );

        match failure {
            Some(e) => Err(e),
            None => Ok(evaluation),
        }
    }

    /// Evaluate against current state without persisting anything
    pub async fn preview(&self, reading: &SensorReading) -> Result<Evaluation> {
        validate_source(reading)?;
        let open_alerts = self.repository.open_for_sensor(&reading.sensor_id).await?;
        Ok(self.evaluator.evaluate(reading, &open_alerts))
    }

    async fn apply(&self, decision: &AlertDecision) -> Result<()> {
        match decision {
            AlertDecision::NoAction { .. } => Ok(()),
            AlertDecision::Raise(alert) => {
                if let Some(existing) = self.repository.get(alert.id).await? {
                    debug!(
                        alert_id = %alert.id,
                        status = existing.status.as_str(),
                        "Alert already recorded for this reading, skipping raise"
                    );
                    return Ok(());
                }

                self.repository.create(alert).await?;
                info!(
                    alert_id = %alert.id,
                    sensor_id = %alert.sensor_id,
                    kind = %alert.kind,
                    severity = %alert.severity,
                    "Alert raised"
                );
                self.notify(NotificationEvent::Raised, alert).await;
                Ok(())
            }
            AlertDecision::Escalate {
                alert_id,
                severity,
                message,
                value,
                threshold,
                triggered_at,
                ..
            } => {
                let alert = self
                    .repository
                    .escalate(
                        *alert_id,
                        EscalationUpdate {
                            severity: *severity,
                            message: message.clone(),
                            value: *value,
                            threshold: *threshold,
                            triggered_at: *triggered_at,
                        },
                    )
                    .await?;
                info!(alert_id = %alert.id, severity = %alert.severity, "Alert escalated");
                if self.config.notify_on_escalate {
                    self.notify(NotificationEvent::Escalated, &alert).await;
                }
                Ok(())
            }
            AlertDecision::Resolve {
                alert_id,
                resolved_at,
                ..
            } => {
                let alert = self.repository.resolve(*alert_id, *resolved_at).await?;
                info!(alert_id = %alert.id, kind = %alert.kind, "Alert resolved");
                if self.config.notify_on_resolve {
                    self.notify(NotificationEvent::Resolved, &alert).await;
                }
                Ok(())
            }
        }
    }

    /// Operator acknowledgement
    pub async fn acknowledge(&self, id: Uuid) -> Result<Alert> {
        let sensor_id = self.lookup(id).await?.sensor_id;
        let lock = self.source_lock(&sensor_id);
        let result = {
            let _guard = lock.lock().await;
            self.repository.acknowledge(id, Utc::now()).await
        };
        self.release_source_lock(&sensor_id, lock);

        let alert = result?;
        info!(alert_id = %id, "Alert acknowledged");
        Ok(alert)
    }

    /// Operator resolution
    pub async fn resolve(&self, id: Uuid) -> Result<Alert> {
        let sensor_id = self.lookup(id).await?.sensor_id;
        let lock = self.source_lock(&sensor_id);
        let result = {
            let _guard = lock.lock().await;
            self.repository.resolve(id, Utc::now()).await
        };
        self.release_source_lock(&sensor_id, lock);

        let alert = result?;
        info!(alert_id = %id, "Alert resolved by operator");
        if self.config.notify_on_resolve {
            self.notify(NotificationEvent::Resolved, &alert).await;
        }
        Ok(alert)
    }

    async fn lookup(&self, id: Uuid) -> Result<Alert> {
        self.repository
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found("Alert", id.to_string()))
    }

    async fn notify(&self, event: NotificationEvent, alert: &Alert) {
        let Some(notifier) = &self.notifier else {
            return;
        };

        let results = notifier.send_all(event, alert).await;
        let failed = results.iter().filter(|r| !r.success).count();
        if failed > 0 {
            error!(
                alert_id = %alert.id,
                failed,
                total = results.len(),
                "Some notifications were not delivered"
            );
        }
    }
}

fn validate_source(reading: &SensorReading) -> Result<()> {
    if reading.sensor_id.trim().is_empty() {
        return Err(Error::validation("sensorId must not be empty"));
    }
    Ok(())
}

fn status_label(evaluation: &Evaluation) -> &'static str {
    match evaluation.status {
        ReadingStatus::Normal => "normal",
        ReadingStatus::Warning => "warning",
        ReadingStatus::Critical => "critical",
    }
}
