//! Notification events.
//!
//! Session lifecycle and failure events emitted towards the notification
//! channels. Emission is fire-and-forget; transport failures never reach the
//! session state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a notification event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Default for Severity {
    fn default() -> Self {
        Self::Info
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Kinds of session events that trigger notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    /// Broadcast created and bound; session registered.
    Configured,
    /// Session registered with a future activation time.
    Scheduled,
    /// A scheduled session was activated.
    Activated,
    /// The session reached Live.
    Started,
    /// Health checks failed past the debounce threshold.
    Degraded,
    /// A reconnect attempt is being made.
    Reconnecting,
    /// The session returned to Live after a reconnect.
    Recovered,
    /// A secondary destination failed (session-level state unaffected).
    ChildStreamFailed,
    /// The session was stopped on request.
    Stopped,
    /// The retry budget was exhausted.
    RetriesExhausted,
    /// The session failed for a reason other than retry exhaustion.
    Failed,
}

impl SessionEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configured => "configured",
            Self::Scheduled => "scheduled",
            Self::Activated => "activated",
            Self::Started => "started",
            Self::Degraded => "degraded",
            Self::Reconnecting => "reconnecting",
            Self::Recovered => "recovered",
            Self::ChildStreamFailed => "child_stream_failed",
            Self::Stopped => "stopped",
            Self::RetriesExhausted => "retries_exhausted",
            Self::Failed => "failed",
        }
    }

    /// Default severity for this kind of event.
    pub fn default_severity(&self) -> Severity {
        match self {
            Self::Configured | Self::Scheduled | Self::Activated | Self::Started
            | Self::Recovered | Self::Stopped => Severity::Info,
            Self::Degraded | Self::Reconnecting | Self::ChildStreamFailed => Severity::Warning,
            Self::RetriesExhausted | Self::Failed => Severity::Critical,
        }
    }
}

impl std::fmt::Display for SessionEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A notification about one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub session_id: String,
    pub session_name: String,
    pub message: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

impl SessionEvent {
    /// Create an event with the kind's default severity.
    pub fn new(
        kind: SessionEventKind,
        session_id: impl Into<String>,
        session_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            session_id: session_id.into(),
            session_name: session_name.into(),
            message: message.into(),
            severity: kind.default_severity(),
            timestamp: Utc::now(),
        }
    }

    /// Override the severity.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// A short human-readable subject line.
    pub fn subject(&self) -> String {
        format!("Stream {} {}", self.session_name, self.kind)
    }
}
