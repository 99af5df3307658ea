//! # LabWatch
//!
//! Alert evaluation for laboratory environment sensors.
//!
//! LabWatch classifies sensor readings (temperature/humidity, air quality,
//! vibration, thermal imaging and people counting) against configured
//! thresholds and decides which alerts to raise, escalate or resolve.
//!
//! ## Architecture
//!
//! - **Models**: Sensor readings, alerts and evaluation results
//! - **Alerting**: The pure evaluator, alert storage and notifications
//! - **API**: REST API for ingesting readings and managing alerts
//!
//! ## Quick Start
//!
//! ```bash
//! # Start the API server
//! labwatch serve
//!
//! # Evaluate a single reading
//! labwatch evaluate --reading reading.json
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod alerting;
pub mod api;
pub mod config;
pub mod error;
pub mod models;

pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::alerting::{AlertEvaluator, AlertMonitor, AlertRepository, InMemoryAlertRepository};
    pub use crate::config::Config;
    pub use crate::error::{Error, EvaluationError, Result};
    pub use crate::models::*;
}
