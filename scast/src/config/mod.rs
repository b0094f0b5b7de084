//! Application configuration.
//!
//! Environment-variable driven, loaded once at startup. Orchestrator tuning
//! (sampling interval, staleness window, debounce, reconnect budget) lives
//! here as named fields with documented defaults rather than magic numbers.

use std::time::Duration;

use crate::domain::{Privacy, ReconnectPolicy};
use crate::monitor::{MonitorConfig, SecondaryFailurePolicy};
use crate::notification::{ChannelConfig, EmailConfig, WebhookConfig};
use crate::remote::OAuthConfig;
use crate::{Error, Result};

/// Default number of log entries kept per session.
const DEFAULT_LOG_CAPACITY: usize = 100;

/// Default number of log entries returned by `status()`.
const DEFAULT_STATUS_LOG_TAIL: usize = 10;

/// Default grace period for terminating push processes.
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub project_name: String,
    pub default_privacy: Privacy,
    pub default_resolution: String,
    pub default_bitrate: String,
    /// OAuth credentials for the remote platform.
    pub oauth: Option<OAuthConfig>,
    /// Path to the push binary.
    pub push_binary: String,
    /// Health monitor tuning, shared by all sessions.
    pub monitor: MonitorConfig,
    /// Reconnect policy applied to new sessions.
    pub reconnect: ReconnectPolicy,
    /// Scheduler tick interval.
    pub scheduler_tick: Duration,
    /// Grace period for terminating push processes.
    pub shutdown_grace: Duration,
    /// Per-session log buffer capacity.
    pub log_capacity: usize,
    /// Number of log entries returned by `status()`.
    pub status_log_tail: usize,
    /// Notification channel configurations.
    pub channels: Vec<ChannelConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            project_name: "scast".to_string(),
            default_privacy: Privacy::Unlisted,
            default_resolution: "1080p".to_string(),
            default_bitrate: "4500k".to_string(),
            oauth: None,
            push_binary: "ffmpeg".to_string(),
            monitor: MonitorConfig::default(),
            reconnect: ReconnectPolicy::default(),
            scheduler_tick: crate::scheduler::DEFAULT_TICK_INTERVAL,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            log_capacity: DEFAULT_LOG_CAPACITY,
            status_log_tail: DEFAULT_STATUS_LOG_TAIL,
            channels: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from process environment variables.
    pub fn load() -> Result<Self> {
        Self::from_env(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_env(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(name) = get("PROJECT_NAME") {
            config.project_name = name;
        }
        if let Some(privacy) = get("DEFAULT_PRIVACY_STATUS") {
            config.default_privacy = Privacy::parse(&privacy).ok_or_else(|| {
                Error::config(format!("invalid DEFAULT_PRIVACY_STATUS '{privacy}'"))
            })?;
        }
        if let Some(resolution) = get("DEFAULT_RESOLUTION") {
            config.default_resolution = resolution;
        }
        if let Some(bitrate) = get("DEFAULT_BITRATE") {
            config.default_bitrate = bitrate;
        }
        if let Some(binary) = get("SCAST_FFMPEG_PATH") {
            config.push_binary = binary;
        }

        config.oauth = match (
            get("YOUTUBE_OAUTH_CLIENT_ID"),
            get("YOUTUBE_OAUTH_CLIENT_SECRET"),
            get("YOUTUBE_OAUTH_REFRESH_TOKEN"),
        ) {
            (Some(client_id), Some(client_secret), Some(refresh_token)) => Some(OAuthConfig {
                client_id,
                client_secret,
                refresh_token,
            }),
            (None, None, None) => None,
            _ => {
                return Err(Error::config(
                    "YOUTUBE_OAUTH_CLIENT_ID, YOUTUBE_OAUTH_CLIENT_SECRET and \
                     YOUTUBE_OAUTH_REFRESH_TOKEN must be set together",
                ));
            }
        };

        config.monitor = MonitorConfig {
            sample_interval: parse_secs(&get, "SCAST_MONITOR_INTERVAL_SECS")?
                .unwrap_or(config.monitor.sample_interval),
            staleness_window: parse_secs(&get, "SCAST_STALENESS_WINDOW_SECS")?
                .unwrap_or(config.monitor.staleness_window),
            debounce_samples: parse_num(&get, "SCAST_DEBOUNCE_SAMPLES")?
                .unwrap_or(config.monitor.debounce_samples),
            stabilization_samples: parse_num(&get, "SCAST_STABILIZATION_SAMPLES")?
                .unwrap_or(config.monitor.stabilization_samples),
            first_sample_deadline: parse_secs(&get, "SCAST_FIRST_SAMPLE_DEADLINE_SECS")?
                .unwrap_or(config.monitor.first_sample_deadline),
            secondary_failure_policy: match get("SCAST_SECONDARY_FAILURE_POLICY").as_deref() {
                None => SecondaryFailurePolicy::default(),
                Some("ignore") => SecondaryFailurePolicy::Ignore,
                Some("degrade") => SecondaryFailurePolicy::Degrade,
                Some(other) => {
                    return Err(Error::config(format!(
                        "invalid SCAST_SECONDARY_FAILURE_POLICY '{other}'"
                    )));
                }
            },
        };

        if let Some(max_retries) = parse_num(&get, "SCAST_MAX_RETRIES")? {
            config.reconnect.max_retries = max_retries;
        }
        if let Some(initial) = parse_num(&get, "SCAST_RECONNECT_INITIAL_DELAY_MS")? {
            config.reconnect.initial_delay_ms = initial;
        }
        if let Some(max) = parse_num(&get, "SCAST_RECONNECT_MAX_DELAY_MS")? {
            config.reconnect.max_delay_ms = max;
        }
        if let Some(grace) = parse_secs(&get, "SCAST_SHUTDOWN_GRACE_SECS")? {
            config.shutdown_grace = grace;
        }
        if let Some(capacity) = parse_num(&get, "SCAST_LOG_CAPACITY")? {
            config.log_capacity = capacity;
        }

        config.channels = Self::channels_from_env(&get);
        Ok(config)
    }

    /// Build notification channel configs from the notifier env vars.
    fn channels_from_env(get: &impl Fn(&str) -> Option<String>) -> Vec<ChannelConfig> {
        let mut channels = Vec::new();

        if let Some(url) = get("NOTIFY_WEBHOOK_URL") {
            channels.push(ChannelConfig::Webhook(WebhookConfig {
                enabled: true,
                url,
                ..Default::default()
            }));
        }

        if let (Some(host), Some(from), Some(to)) = (
            get("SMTP_HOST"),
            get("NOTIFY_EMAIL_FROM"),
            get("NOTIFY_EMAIL_TO"),
        ) {
            channels.push(ChannelConfig::Email(EmailConfig {
                enabled: true,
                smtp_host: host,
                smtp_port: get("SMTP_PORT")
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(587),
                smtp_username: get("SMTP_USERNAME"),
                smtp_password: get("SMTP_PASSWORD"),
                from_address: from,
                to_addresses: to
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                ..Default::default()
            }));
        }

        channels
    }
}

fn parse_num<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| Error::config(format!("invalid {key} '{raw}'"))),
    }
}

fn parse_secs(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<Duration>> {
    Ok(parse_num::<u64>(get, key)?.map(Duration::from_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_env(|_| None).unwrap();
        assert_eq!(config.project_name, "scast");
        assert_eq!(config.default_bitrate, "4500k");
        assert_eq!(config.push_binary, "ffmpeg");
        assert!(config.oauth.is_none());
        assert!(config.channels.is_empty());
        assert_eq!(config.reconnect.max_retries, 3);
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_env(env(&[
            ("PROJECT_NAME", "mybot"),
            ("DEFAULT_PRIVACY_STATUS", "private"),
            ("SCAST_MONITOR_INTERVAL_SECS", "10"),
            ("SCAST_DEBOUNCE_SAMPLES", "4"),
            ("SCAST_MAX_RETRIES", "7"),
            ("SCAST_SECONDARY_FAILURE_POLICY", "degrade"),
        ]))
        .unwrap();

        assert_eq!(config.project_name, "mybot");
        assert_eq!(config.default_privacy, Privacy::Private);
        assert_eq!(config.monitor.sample_interval, Duration::from_secs(10));
        assert_eq!(config.monitor.debounce_samples, 4);
        assert_eq!(config.reconnect.max_retries, 7);
        assert_eq!(
            config.monitor.secondary_failure_policy,
            SecondaryFailurePolicy::Degrade
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(AppConfig::from_env(env(&[("DEFAULT_PRIVACY_STATUS", "secret")])).is_err());
        assert!(AppConfig::from_env(env(&[("SCAST_MONITOR_INTERVAL_SECS", "soon")])).is_err());
        assert!(
            AppConfig::from_env(env(&[("SCAST_SECONDARY_FAILURE_POLICY", "panic")])).is_err()
        );
    }

    #[test]
    fn test_partial_oauth_rejected() {
        let result = AppConfig::from_env(env(&[("YOUTUBE_OAUTH_CLIENT_ID", "id")]));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_notifier_channels() {
        let config = AppConfig::from_env(env(&[
            ("NOTIFY_WEBHOOK_URL", "https://hooks.example/scast"),
            ("SMTP_HOST", "smtp.example.com"),
            ("NOTIFY_EMAIL_FROM", "bot@example.com"),
            ("NOTIFY_EMAIL_TO", "ops@example.com, oncall@example.com"),
        ]))
        .unwrap();

        assert_eq!(config.channels.len(), 2);
        assert!(config.channels.iter().all(|c| c.is_enabled()));
        match &config.channels[1] {
            ChannelConfig::Email(email) => {
                assert_eq!(email.to_addresses.len(), 2);
                assert_eq!(email.smtp_port, 587);
            }
            other => panic!("expected email channel, got {}", other.channel_type()),
        }
    }
}
