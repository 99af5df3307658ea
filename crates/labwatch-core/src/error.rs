//! Error types for LabWatch

use serde::Serialize;
use thiserror::Error;

use crate::models::AlertKind;

/// Result type alias using LabWatch's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for LabWatch operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found error
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// An open alert of the same kind already exists for the source
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Alert lifecycle transition not allowed from the current status
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Notification delivery setup error
    #[error("Notification error: {0}")]
    Notification(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a not found error
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Per-check evaluation failure.
///
/// These are returned as values inside an evaluation and never abort it:
/// a failed check leaves the other checks of the same reading untouched.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "error", rename_all = "camelCase")]
pub enum EvaluationError {
    /// A metric the check depends on is missing or not numeric
    #[error("invalid reading for {kind} check: {reason}")]
    #[serde(rename_all = "camelCase")]
    InvalidReading { kind: AlertKind, reason: String },

    /// No threshold table exists for the reading's sensor type
    #[error("no thresholds defined for sensor type of sensor {sensor_id}")]
    #[serde(rename_all = "camelCase")]
    UnknownSensorType { sensor_id: String },
}

impl EvaluationError {
    /// Check kind the failure belongs to, if any
    pub fn kind(&self) -> Option<AlertKind> {
        match self {
            EvaluationError::InvalidReading { kind, .. } => Some(*kind),
            EvaluationError::UnknownSensorType { .. } => None,
        }
    }

    pub(crate) fn invalid(kind: AlertKind, reason: impl Into<String>) -> Self {
        Self::InvalidReading {
            kind,
            reason: reason.into(),
        }
    }
}
