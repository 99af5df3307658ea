//! Evaluation results

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::alert::{Alert, AlertKind, Severity};
use super::reading::ReadingStatus;
use crate::error::EvaluationError;

/// What the caller should do for one check of a reading
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum AlertDecision {
    /// Nothing to persist
    NoAction { kind: AlertKind },

    /// Create this alert
    Raise(Alert),

    /// Raise the severity of an open alert in place
    #[serde(rename_all = "camelCase")]
    Escalate {
        alert_id: Uuid,
        kind: AlertKind,
        previous_severity: Severity,
        severity: Severity,
        message: String,
        value: f64,
        threshold: f64,
        triggered_at: DateTime<Utc>,
    },

    /// Close an open alert
    #[serde(rename_all = "camelCase")]
    Resolve {
        alert_id: Uuid,
        kind: AlertKind,
        resolved_at: DateTime<Utc>,
    },
}

impl AlertDecision {
    /// Check kind the decision belongs to
    pub fn kind(&self) -> AlertKind {
        match self {
            AlertDecision::NoAction { kind }
            | AlertDecision::Escalate { kind, .. }
            | AlertDecision::Resolve { kind, .. } => *kind,
            AlertDecision::Raise(alert) => alert.kind,
        }
    }

    /// Short action name, used for logs and metric labels
    pub fn action(&self) -> &'static str {
        match self {
            AlertDecision::NoAction { .. } => "no_action",
            AlertDecision::Raise(_) => "raise",
            AlertDecision::Escalate { .. } => "escalate",
            AlertDecision::Resolve { .. } => "resolve",
        }
    }

    /// Whether the decision requires a write
    pub fn is_actionable(&self) -> bool {
        !matches!(self, AlertDecision::NoAction { .. })
    }
}

/// Outcome of evaluating one reading
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    /// Source sensor
    pub sensor_id: String,

    /// Status derived from all successful checks
    pub status: ReadingStatus,

    /// At most one decision per check kind
    pub decisions: Vec<AlertDecision>,

    /// Checks that could not be evaluated
    pub errors: Vec<EvaluationError>,
}

impl Evaluation {
    /// Decision for a given check kind, if that check succeeded
    pub fn decision_for(&self, kind: AlertKind) -> Option<&AlertDecision> {
        self.decisions.iter().find(|d| d.kind() == kind)
    }

    /// Decisions that require a write
    pub fn actionable(&self) -> impl Iterator<Item = &AlertDecision> {
        self.decisions.iter().filter(|d| d.is_actionable())
    }
}
