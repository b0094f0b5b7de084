//! Session state machine.

use crate::Error;
use serde::{Deserialize, Serialize};

/// Lifecycle states of a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// The session has a future activation time and no process running.
    Scheduled,
    /// Remote broadcast/stream binding and process launch are in flight.
    Starting,
    /// The primary push process has been confirmed healthy at least once.
    Live,
    /// A health check failed; a reconnect decision is pending.
    Degraded,
    /// A restart attempt is in flight.
    Reconnecting,
    /// Terminal: the user requested a stop.
    Stopped,
    /// Terminal: retries exhausted or an unrecoverable remote error occurred.
    Failed,
}

impl SessionState {
    /// Convert to a stable string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::Starting => "STARTING",
            Self::Live => "LIVE",
            Self::Degraded => "DEGRADED",
            Self::Reconnecting => "RECONNECTING",
            Self::Stopped => "STOPPED",
            Self::Failed => "FAILED",
        }
    }

    /// Parse from the string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SCHEDULED" => Some(Self::Scheduled),
            "STARTING" => Some(Self::Starting),
            "LIVE" => Some(Self::Live),
            "DEGRADED" => Some(Self::Degraded),
            "RECONNECTING" => Some(Self::Reconnecting),
            "STOPPED" => Some(Self::Stopped),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Check if this state is terminal. Terminal sessions accept no further
    /// transitions and keep no running processes.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    /// Check if this state should have push processes running.
    pub fn has_processes(&self) -> bool {
        matches!(self, Self::Starting | Self::Live | Self::Degraded | Self::Reconnecting)
    }

    /// Check if health sampling applies in this state.
    pub fn is_monitored(&self) -> bool {
        matches!(self, Self::Starting | Self::Live | Self::Reconnecting)
    }

    /// Validate a state transition.
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;

        match (self, target) {
            // Same state is always allowed (e.g. repeated reconnect attempts)
            (from, to) if from == &to => !from.is_terminal(),

            // Any non-terminal state can be stopped
            (from, Stopped) if !from.is_terminal() => true,

            (Scheduled, Starting) => true,
            (Starting, Live | Failed) => true,
            (Live, Degraded) => true,
            (Degraded, Reconnecting | Failed) => true,
            (Reconnecting, Live | Failed) => true,

            _ => false,
        }
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&self, target: SessionState) -> Result<SessionState, Error> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(Error::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: target.as_str().to_string(),
            })
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip() {
        for state in [
            SessionState::Scheduled,
            SessionState::Starting,
            SessionState::Live,
            SessionState::Degraded,
            SessionState::Reconnecting,
            SessionState::Stopped,
            SessionState::Failed,
        ] {
            assert_eq!(SessionState::parse(state.as_str()), Some(state));
        }
        assert_eq!(SessionState::parse("invalid"), None);
    }

    #[test]
    fn test_happy_path_transitions() {
        assert!(SessionState::Scheduled.can_transition_to(SessionState::Starting));
        assert!(SessionState::Starting.can_transition_to(SessionState::Live));
        assert!(SessionState::Live.can_transition_to(SessionState::Degraded));
        assert!(SessionState::Degraded.can_transition_to(SessionState::Reconnecting));
        assert!(SessionState::Reconnecting.can_transition_to(SessionState::Live));
    }

    #[test]
    fn test_stop_from_any_non_terminal() {
        for state in [
            SessionState::Scheduled,
            SessionState::Starting,
            SessionState::Live,
            SessionState::Degraded,
            SessionState::Reconnecting,
        ] {
            assert!(state.can_transition_to(SessionState::Stopped));
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [SessionState::Stopped, SessionState::Failed] {
            assert!(terminal.is_terminal());
            for target in [
                SessionState::Scheduled,
                SessionState::Starting,
                SessionState::Live,
                SessionState::Degraded,
                SessionState::Reconnecting,
                SessionState::Stopped,
                SessionState::Failed,
            ] {
                assert!(!terminal.can_transition_to(target));
            }
        }
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!SessionState::Scheduled.can_transition_to(SessionState::Live));
        assert!(!SessionState::Live.can_transition_to(SessionState::Reconnecting));
        assert!(!SessionState::Starting.can_transition_to(SessionState::Degraded));
    }

    #[test]
    fn test_transition_to_error() {
        let result = SessionState::Stopped.transition_to(SessionState::Live);
        assert!(matches!(
            result,
            Err(Error::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_reconnecting_self_transition() {
        // Repeated reconnect attempts stay in Reconnecting
        assert!(SessionState::Reconnecting.can_transition_to(SessionState::Reconnecting));
    }
}
