//! Configuration management for LabWatch

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::alerting::{NotificationChannel, ThresholdTable};
use crate::error::Result;

/// Environment variable prefix, e.g. `LABWATCH__SERVER__PORT=9090`
pub const ENV_PREFIX: &str = "LABWATCH";

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// Alert thresholds
    pub thresholds: ThresholdConfig,

    /// Alerting behaviour
    pub alerting: AlertingConfig,

    /// Notification delivery
    pub notifications: NotificationConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// Without an explicit path the platform config directory is consulted
    /// (`~/.config/labwatch/config.toml` on Linux) if such a file exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        match path {
            Some(path) => {
                debug!(path = %path.display(), "Loading configuration file");
                builder = builder.add_source(config::File::from(path).required(true));
            }
            None => {
                if let Some(path) = default_config_path().filter(|p| p.exists()) {
                    debug!(path = %path.display(), "Loading default configuration file");
                    builder = builder.add_source(config::File::from(path).required(false));
                }
            }
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the service cannot run with
    pub fn validate(&self) -> Result<()> {
        ThresholdTable::from_config(&self.thresholds)?;

        for channel in &self.notifications.channels {
            channel.validate()?;
        }

        Ok(())
    }
}

/// Platform-specific location of `config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("io", "labwatch", "labwatch")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// HTTP API port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Alert thresholds per metric.
///
/// Each metric has a `high` and a `critical` bound; a reading at or above a
/// bound is classified with that severity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// °C
    pub critical_temp: f64,
    /// °C
    pub high_temp: f64,
    /// % relative humidity
    pub critical_humidity: f64,
    /// % relative humidity
    pub high_humidity: f64,
    /// µg/m³
    pub critical_pm25: f64,
    /// µg/m³
    pub high_pm25: f64,
    /// µg/m³
    pub critical_pm10: f64,
    /// µg/m³
    pub high_pm10: f64,
    /// g RMS
    pub critical_vibration: f64,
    /// g RMS
    pub high_vibration: f64,
    /// °C, hottest thermal imager cell
    pub critical_thermal_max: f64,
    /// °C, hottest thermal imager cell
    pub high_thermal_max: f64,
    /// People in the room
    pub critical_occupancy: u32,
    /// People in the room
    pub high_occupancy: u32,
    /// People counts below this detector confidence are not evaluated
    pub min_people_confidence: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            critical_temp: 35.0,
            high_temp: 30.0,
            critical_humidity: 80.0,
            high_humidity: 70.0,
            critical_pm25: 55.5,
            high_pm25: 35.5,
            critical_pm10: 255.0,
            high_pm10: 155.0,
            critical_vibration: 1.0,
            high_vibration: 0.5,
            critical_thermal_max: 60.0,
            high_thermal_max: 45.0,
            critical_occupancy: 20,
            high_occupancy: 15,
            min_people_confidence: 0.5,
        }
    }
}

/// Alerting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    /// Send a notification when an alert resolves on its own
    pub notify_on_resolve: bool,
    /// Notify when an open alert is escalated
    pub notify_on_escalate: bool,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            notify_on_resolve: true,
            notify_on_escalate: true,
        }
    }
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Delivery channels; empty disables notifications
    pub channels: Vec<NotificationChannel>,
    /// HTTP timeout per delivery
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or pretty)
    pub format: String,
    /// Directory for daily-rotated log files; stderr only when unset
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            directory: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.thresholds.critical_temp, 35.0);
        assert_eq!(config.thresholds.high_humidity, 70.0);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9191

[thresholds]
high_temp = 28.0
critical_temp = 33.0

[notifications]
timeout = "3s"

[[notifications.channels]]
type = "webhook"
url = "http://localhost:9999/hook"
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();

        assert_eq!(config.server.port, 9191);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.thresholds.high_temp, 28.0);
        assert_eq!(config.thresholds.critical_temp, 33.0);
        assert_eq!(config.thresholds.high_humidity, 70.0);
        assert_eq!(config.notifications.timeout, Duration::from_secs(3));
        assert_eq!(config.notifications.channels.len(), 1);
    }

    #[test]
    fn test_load_rejects_inverted_thresholds() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[thresholds]\nhigh_temp = 40.0\ncritical_temp = 35.0").unwrap();

        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = Config::load(Some(Path::new("/nonexistent/labwatch.toml")));
        assert!(result.is_err());
    }
}
