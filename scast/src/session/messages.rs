//! Command and status types for session runners.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::Result;
use crate::domain::{ContentSource, LogEntry, SessionState};
use crate::monitor::ChildHealth;

/// Commands accepted by a session runner.
///
/// External callers never mutate session state directly; every request goes
/// through the runner's mailbox so a user-initiated stop can never race a
/// health-triggered reconnect.
#[derive(Debug)]
pub enum SessionCommand {
    /// Transition a Scheduled session into Starting (sent by the scheduler).
    Activate,
    /// Stop the session. Idempotent: stopping a terminal session is a no-op.
    Stop { reply: oneshot::Sender<Result<()>> },
    /// Snapshot current state, child health, and recent logs.
    Status {
        log_tail: usize,
        reply: oneshot::Sender<SessionStatusSnapshot>,
    },
    /// Post a message to the broadcast's live chat.
    SendChat {
        text: String,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Disable the broadcast's live chat.
    DisableChat { reply: oneshot::Sender<Result<()>> },
    /// Swap the content source for the next (re)start.
    UpdateContent {
        content: ContentSource,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Tear the runner down so the session can be removed from the registry.
    Purge { reply: oneshot::Sender<()> },
}

/// Point-in-time view of a session, served from the runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatusSnapshot {
    pub id: String,
    pub name: String,
    pub state: SessionState,
    pub stream_id: Option<String>,
    pub retry_count: u32,
    pub last_failure: Option<String>,
    pub children: Vec<ChildHealth>,
    pub recent_logs: Vec<LogEntry>,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_transition_at: DateTime<Utc>,
}

/// Compact listing entry for `list()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub name: String,
    pub state: SessionState,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
}

impl From<&SessionStatusSnapshot> for SessionSummary {
    fn from(snapshot: &SessionStatusSnapshot) -> Self {
        Self {
            id: snapshot.id.clone(),
            name: snapshot.name.clone(),
            state: snapshot.state,
            retry_count: snapshot.retry_count,
            created_at: snapshot.created_at,
        }
    }
}
