//! Email notification channel using SMTP.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::NotificationChannel;
use crate::notification::events::{SessionEvent, Severity};
use crate::{Error, Result};

/// Email channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Whether the channel is enabled.
    pub enabled: bool,
    /// SMTP server host.
    pub smtp_host: String,
    /// SMTP server port.
    pub smtp_port: u16,
    /// SMTP username.
    pub smtp_username: Option<String>,
    /// SMTP password.
    pub smtp_password: Option<String>,
    /// Sender address.
    pub from_address: String,
    /// Recipient addresses.
    pub to_addresses: Vec<String>,
    /// Minimum severity to deliver (email defaults to warnings and above).
    #[serde(default = "default_email_severity")]
    pub min_severity: Severity,
}

fn default_email_severity() -> Severity {
    Severity::Warning
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: "localhost".to_string(),
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            from_address: String::new(),
            to_addresses: Vec::new(),
            min_severity: default_email_severity(),
        }
    }
}

/// Email notification channel.
pub struct EmailChannel {
    config: EmailConfig,
}

impl EmailChannel {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn build_body(&self, event: &SessionEvent) -> String {
        format!(
            "{}\n\n{}\n\nSeverity: {}\nSession: {} ({})\nTime: {}",
            event.subject(),
            event.message,
            event.severity,
            event.session_name,
            event.session_id,
            event.timestamp.to_rfc3339()
        )
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(
            &self.config.smtp_host,
        )
        .map_err(|e| Error::Other(format!("invalid SMTP relay: {e}")))?
        .port(self.config.smtp_port);

        if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        Ok(builder.build())
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn channel_type(&self) -> &'static str {
        "email"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
            && !self.config.smtp_host.is_empty()
            && !self.config.from_address.is_empty()
            && !self.config.to_addresses.is_empty()
    }

    async fn send(&self, event: &SessionEvent) -> Result<()> {
        if !self.is_enabled() || event.severity < self.config.min_severity {
            return Ok(());
        }

        let from: Mailbox = self
            .config
            .from_address
            .parse()
            .map_err(|e| Error::Other(format!("invalid from address: {e}")))?;

        let mut builder = Message::builder().from(from).subject(event.subject());
        for to in &self.config.to_addresses {
            let mailbox: Mailbox = to
                .parse()
                .map_err(|e| Error::Other(format!("invalid recipient '{to}': {e}")))?;
            builder = builder.to(mailbox);
        }

        let message = builder
            .body(self.build_body(event))
            .map_err(|e| Error::Other(format!("failed to build email: {e}")))?;

        self.transport()?
            .send(message)
            .await
            .map_err(|e| Error::Other(format!("SMTP send failed: {e}")))?;

        debug!(kind = %event.kind, "email notification delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::events::SessionEventKind;

    #[test]
    fn test_email_config_default() {
        let config = EmailConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.smtp_port, 587);
        assert_eq!(config.min_severity, Severity::Warning);
    }

    #[test]
    fn test_channel_disabled_without_recipients() {
        let channel = EmailChannel::new(EmailConfig {
            enabled: true,
            from_address: "bot@example.com".into(),
            ..Default::default()
        });
        assert!(!channel.is_enabled());
    }

    #[test]
    fn test_build_body() {
        let channel = EmailChannel::new(EmailConfig::default());
        let event = SessionEvent::new(
            SessionEventKind::RetriesExhausted,
            "bc-1",
            "demo",
            "Reconnect retries exhausted after 3 attempts",
        );
        let body = channel.build_body(&event);
        assert!(body.contains("Stream demo retries_exhausted"));
        assert!(body.contains("Severity: critical"));
        assert!(body.contains("bc-1"));
    }
}
