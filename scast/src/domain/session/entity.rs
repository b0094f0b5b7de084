//! Session entity.

use chrono::{DateTime, Utc};

use super::config::{ContentSource, SessionConfig};
use super::state::SessionState;
use crate::Result;
use crate::domain::value_objects::{LogBuffer, ReconnectPolicy};

/// A single streaming session: configuration, platform bindings, state, and
/// bounded log history.
///
/// The session id is the broadcast id returned by the remote platform.
/// All mutation happens inside the session's runner task (single-writer).
#[derive(Debug)]
pub struct Session {
    /// Broadcast id returned by the remote platform.
    pub id: String,
    /// Unique user-supplied name.
    pub name: String,
    /// Immutable creation-time configuration.
    pub config: SessionConfig,
    /// Reconnect policy applied to this session.
    pub reconnect_policy: ReconnectPolicy,
    /// Current lifecycle state.
    state: SessionState,
    /// Platform stream id bound to the broadcast (set during Starting).
    pub stream_id: Option<String>,
    /// Primary ingestion URL (set during Starting).
    pub ingestion_url: Option<String>,
    /// Live chat id, when the platform provides one.
    pub live_chat_id: Option<String>,
    /// Number of reconnect attempts since the session was last stable.
    pub retry_count: u32,
    /// Reason for the most recent failure, if any.
    pub last_failure: Option<String>,
    /// Replacement content to apply on the next (re)start.
    pub pending_content: Option<ContentSource>,
    /// Bounded log history.
    pub logs: LogBuffer,
    pub created_at: DateTime<Utc>,
    pub last_transition_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        config: SessionConfig,
        reconnect_policy: ReconnectPolicy,
        initial_state: SessionState,
        log_capacity: usize,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: config.name.clone(),
            config,
            reconnect_policy,
            state: initial_state,
            stream_id: None,
            ingestion_url: None,
            live_chat_id: None,
            retry_count: 0,
            last_failure: None,
            pending_content: None,
            logs: LogBuffer::new(log_capacity),
            created_at: now,
            last_transition_at: now,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Transition to a new state, appending a log entry.
    ///
    /// Returns an `InvalidStateTransition` error when the move is not legal;
    /// the session is left untouched in that case.
    pub fn transition_to(&mut self, target: SessionState) -> Result<()> {
        let next = self.state.transition_to(target)?;
        self.logs
            .push(format!("State: {} -> {}", self.state, next));
        self.state = next;
        self.last_transition_at = Utc::now();
        Ok(())
    }

    /// The content source to use for the next launch, honoring a pending swap.
    pub fn effective_content(&self) -> &ContentSource {
        self.pending_content.as_ref().unwrap_or(&self.config.content)
    }

    /// Record a failure reason and log it.
    pub fn record_failure(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        self.logs.push(format!("Failure: {reason}"));
        self.last_failure = Some(reason);
    }

    /// All ingestion targets in launch order, primary first.
    ///
    /// Only meaningful once `ingestion_url` is bound.
    pub fn ingestion_targets(&self) -> Vec<String> {
        let mut targets = Vec::with_capacity(self.config.target_count());
        if let Some(primary) = &self.ingestion_url {
            targets.push(primary.clone());
        }
        targets.extend(self.config.extra_ingestion_urls.iter().cloned());
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::config::Privacy;

    fn test_config() -> SessionConfig {
        SessionConfig {
            name: "demo".into(),
            title: "Demo".into(),
            description: String::new(),
            privacy: Privacy::Unlisted,
            resolution: "1080p".into(),
            bitrate: "4500k".into(),
            content: ContentSource::new("/media/loop.mp4"),
            extra_ingestion_urls: vec!["rtmp://relay.example/live/key".into()],
            scheduled_start: None,
        }
    }

    fn test_session() -> Session {
        Session::new(
            "bc-1",
            test_config(),
            ReconnectPolicy::default(),
            SessionState::Starting,
            50,
        )
    }

    #[test]
    fn test_transition_logs_and_updates() {
        let mut session = test_session();
        assert!(session.logs.is_empty());

        session.transition_to(SessionState::Live).unwrap();
        assert_eq!(session.state(), SessionState::Live);
        assert_eq!(session.logs.len(), 1);
        assert!(session.logs.tail(1)[0].message.contains("STARTING -> LIVE"));
    }

    #[test]
    fn test_illegal_transition_leaves_session_untouched() {
        let mut session = test_session();
        let before = session.last_transition_at;

        assert!(session.transition_to(SessionState::Degraded).is_err());
        assert_eq!(session.state(), SessionState::Starting);
        assert_eq!(session.last_transition_at, before);
        assert!(session.logs.is_empty());
    }

    #[test]
    fn test_effective_content_honors_pending_swap() {
        let mut session = test_session();
        assert_eq!(session.effective_content().source, "/media/loop.mp4");

        session.pending_content = Some(ContentSource::new("/media/other.mp4"));
        assert_eq!(session.effective_content().source, "/media/other.mp4");
    }

    #[test]
    fn test_ingestion_targets_primary_first() {
        let mut session = test_session();
        session.ingestion_url = Some("rtmp://a.rtmp.youtube.com/live2/key".into());
        let targets = session.ingestion_targets();
        assert_eq!(targets.len(), 2);
        assert!(targets[0].contains("youtube"));
        assert!(targets[1].contains("relay.example"));
    }

    #[test]
    fn test_record_failure() {
        let mut session = test_session();
        session.record_failure("process exited with code 1");
        assert_eq!(
            session.last_failure.as_deref(),
            Some("process exited with code 1")
        );
        assert_eq!(session.logs.len(), 1);
    }
}
