//! Generic webhook notification channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::NotificationChannel;
use crate::notification::events::{SessionEvent, Severity};
use crate::{Error, Result};

/// Webhook channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Whether the channel is enabled.
    pub enabled: bool,
    /// Webhook URL.
    pub url: String,
    /// Minimum severity to deliver.
    #[serde(default)]
    pub min_severity: Severity,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    10
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            min_severity: Severity::Info,
            timeout_secs: default_timeout(),
        }
    }
}

/// Generic webhook notification channel posting one JSON document per event.
pub struct WebhookChannel {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(config: WebhookConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn channel_type(&self) -> &'static str {
        "webhook"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.url.is_empty()
    }

    async fn send(&self, event: &SessionEvent) -> Result<()> {
        if !self.is_enabled() || event.severity < self.config.min_severity {
            return Ok(());
        }

        let payload = json!({
            "subject": event.subject(),
            "message": event.message,
            "kind": event.kind,
            "session_id": event.session_id,
            "session_name": event.session_name,
            "severity": event.severity,
            "timestamp": event.timestamp.to_rfc3339(),
        });

        let response = self
            .client
            .post(&self.config.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Other(format!("webhook request failed: {e}")))?;

        response
            .error_for_status()
            .map_err(|e| Error::Other(format!("webhook returned error: {e}")))?;

        debug!(kind = %event.kind, "webhook notification delivered");
        Ok(())
    }
}
