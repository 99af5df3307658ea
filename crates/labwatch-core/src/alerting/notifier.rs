//! Notification delivery for alerts

use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{Alert, Severity};

/// Notification channel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationChannel {
    /// Slack incoming webhook
    Slack {
        webhook_url: String,
        #[serde(default)]
        channel: Option<String>,
    },
    /// Generic JSON webhook
    Webhook {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

impl NotificationChannel {
    /// Short channel name
    pub fn channel_type(&self) -> &'static str {
        match self {
            NotificationChannel::Slack { .. } => "slack",
            NotificationChannel::Webhook { .. } => "webhook",
        }
    }

    /// Reject channels that can never deliver
    pub fn validate(&self) -> Result<()> {
        let url = match self {
            NotificationChannel::Slack { webhook_url, .. } => webhook_url,
            NotificationChannel::Webhook { url, .. } => url,
        };

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::config(format!(
                "{} channel URL must be http(s), got '{url}'",
                self.channel_type()
            )));
        }

        Ok(())
    }
}

/// Alert lifecycle event being announced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationEvent {
    Raised,
    Escalated,
    Resolved,
}

impl NotificationEvent {
    fn title(&self) -> &'static str {
        match self {
            NotificationEvent::Raised => "Alert raised",
            NotificationEvent::Escalated => "Alert escalated",
            NotificationEvent::Resolved => "Alert resolved",
        }
    }
}

/// Result of sending a notification
#[derive(Debug, Clone, Serialize)]
pub struct NotificationResult {
    pub channel_type: String,
    pub success: bool,
    pub error: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// Sends notifications through various channels
#[derive(Debug, Clone)]
pub struct NotificationSender {
    client: Client,
    channels: Vec<NotificationChannel>,
}

impl NotificationSender {
    /// Create a new notification sender
    pub fn new(channels: Vec<NotificationChannel>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Notification(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, channels })
    }

    /// Whether any channel is configured
    pub fn has_channels(&self) -> bool {
        !self.channels.is_empty()
    }

    /// Send an event for an alert to every channel
    pub async fn send_all(&self, event: NotificationEvent, alert: &Alert) -> Vec<NotificationResult> {
        let sends = self
            .channels
            .iter()
            .map(|channel| self.send(channel, event, alert));

        join_all(sends).await
    }

    /// Send a single notification
    pub async fn send(
        &self,
        channel: &NotificationChannel,
        event: NotificationEvent,
        alert: &Alert,
    ) -> NotificationResult {
        let sent_at = Utc::now();

        let result = match channel {
            NotificationChannel::Slack {
                webhook_url,
                channel: slack_channel,
            } => {
                self.send_slack(webhook_url, slack_channel.as_deref(), event, alert)
                    .await
            }
            NotificationChannel::Webhook { url, headers } => {
                self.send_webhook(url, headers, event, alert).await
            }
        };

        if let Err(e) = &result {
            warn!(
                alert_id = %alert.id,
                channel = channel.channel_type(),
                error = %e,
                "Notification failed"
            );
        }

        NotificationResult {
            channel_type: channel.channel_type().to_string(),
            success: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
            sent_at,
        }
    }

    /// Send Slack notification
    async fn send_slack(
        &self,
        webhook_url: &str,
        channel: Option<&str>,
        event: NotificationEvent,
        alert: &Alert,
    ) -> std::result::Result<(), NotificationError> {
        let color = match (event, alert.severity) {
            (NotificationEvent::Resolved, _) => "#28a745",
            (_, Severity::Critical) => "#dc3545",
            (_, Severity::High) => "#ffc107",
        };

        let payload = SlackPayload {
            channel: channel.map(String::from),
            username: Some("LabWatch".to_string()),
            attachments: vec![SlackAttachment {
                color: color.to_string(),
                title: format!("{}: {} in {}", event.title(), alert.kind, alert.room_name),
                text: alert.message.clone(),
                fields: vec![
                    SlackField {
                        title: "Severity".to_string(),
                        value: alert.severity.to_string(),
                        short: true,
                    },
                    SlackField {
                        title: "Sensor".to_string(),
                        value: alert.sensor_id.clone(),
                        short: true,
                    },
                    SlackField {
                        title: "Value".to_string(),
                        value: format!("{:.2}", alert.value),
                        short: true,
                    },
                    SlackField {
                        title: "Threshold".to_string(),
                        value: format!("{}", alert.threshold),
                        short: true,
                    },
                ],
                footer: Some("LabWatch Alerting".to_string()),
                ts: Some(alert.triggered_at.timestamp()),
            }],
        };

        let response = self
            .client
            .post(webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotificationError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::HttpError(format!(
                "Slack returned {}: {}",
                status, body
            )));
        }

        info!(alert_id = %alert.id, "Slack notification sent");
        Ok(())
    }

    /// Send generic webhook notification
    async fn send_webhook(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        event: NotificationEvent,
        alert: &Alert,
    ) -> std::result::Result<(), NotificationError> {
        let payload = WebhookPayload {
            event,
            alert,
            sent_at: Utc::now(),
        };

        let mut request = self.client.post(url).json(&payload);
        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotificationError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::HttpError(format!(
                "Webhook returned {}: {}",
                status, body
            )));
        }

        debug!(alert_id = %alert.id, url = %url, "Webhook notification sent");
        Ok(())
    }
}

/// Notification errors
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("HTTP error: {0}")]
    HttpError(String),
}

// Slack payload types
#[derive(Debug, Serialize)]
struct SlackPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    attachments: Vec<SlackAttachment>,
}

#[derive(Debug, Serialize)]
struct SlackAttachment {
    color: String,
    title: String,
    text: String,
    fields: Vec<SlackField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ts: Option<i64>,
}

#[derive(Debug, Serialize)]
struct SlackField {
    title: String,
    value: String,
    short: bool,
}

// Generic webhook payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload<'a> {
    event: NotificationEvent,
    alert: &'a Alert,
    sent_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertKind, AlertStatus, SensorType};
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn alert() -> Alert {
        Alert {
            id: Uuid::new_v4(),
            room_id: "room-a".to_string(),
            room_name: "Lab A".to_string(),
            sensor_id: "th-1".to_string(),
            sensor_type: SensorType::TempHumidity,
            kind: AlertKind::Temperature,
            severity: Severity::Critical,
            message: "Temperature 36.0°C reached critical threshold of 35°C in Lab A".to_string(),
            value: 36.0,
            threshold: 35.0,
            triggered_at: Utc::now(),
            acknowledged_at: None,
            resolved_at: None,
            status: AlertStatus::Open,
        }
    }

    #[tokio::test]
    async fn test_webhook_delivery() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("x-lab", "north"))
            .and(body_partial_json(serde_json::json!({
                "event": "raised",
                "alert": { "kind": "temperature", "severity": "critical" }
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let channel = NotificationChannel::Webhook {
            url: format!("{}/hook", server.uri()),
            headers: HashMap::from([("x-lab".to_string(), "north".to_string())]),
        };
        let sender = NotificationSender::new(vec![channel], Duration::from_secs(5)).unwrap();

        let results = sender.send_all(NotificationEvent::Raised, &alert()).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].success, "{:?}", results[0].error);
        assert_eq!(results[0].channel_type, "webhook");
    }

    #[tokio::test]
    async fn test_failed_delivery_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let channel = NotificationChannel::Slack {
            webhook_url: format!("{}/slack", server.uri()),
            channel: Some("#lab-alerts".to_string()),
        };
        let sender = NotificationSender::new(vec![channel], Duration::from_secs(5)).unwrap();

        let results = sender.send_all(NotificationEvent::Escalated, &alert()).await;
        assert!(!results[0].success);
        assert!(results[0].error.as_deref().unwrap_or_default().contains("500"));
    }

    #[test]
    fn test_channel_validation() {
        let bad = NotificationChannel::Webhook {
            url: "ftp://example.com".to_string(),
            headers: HashMap::new(),
        };
        assert!(bad.validate().is_err());

        let good = NotificationChannel::Slack {
            webhook_url: "https://hooks.slack.com/services/T/B/X".to_string(),
            channel: None,
        };
        assert!(good.validate().is_ok());
    }
}
