//! Alerting system for LabWatch
//!
//! Threshold evaluation of sensor readings, alert persistence, and
//! notification delivery.

mod evaluator;
mod monitor;
mod notifier;
mod repository;
mod rules;

pub use evaluator::AlertEvaluator;
pub use monitor::AlertMonitor;
pub use notifier::{NotificationChannel, NotificationEvent, NotificationResult, NotificationSender};
pub use repository::{AlertQuery, AlertRepository, EscalationUpdate, InMemoryAlertRepository};
pub use rules::{CheckRule, ThresholdRule, ThresholdTable};
