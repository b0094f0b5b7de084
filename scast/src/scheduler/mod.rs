//! Scheduled session activation.
//!
//! Holds (session id, activation time) pairs and fires activation on a
//! coarse tick for every entry whose time has elapsed. The clock is
//! injectable so activation timing is testable without wall-clock delays.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::SessionRegistry;

/// Default scheduler tick.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Time source used by the scheduler.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fires session activations when their scheduled time arrives.
pub struct Scheduler {
    registry: Arc<SessionRegistry>,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
    tick_interval: Duration,
    cancellation_token: CancellationToken,
}

impl Scheduler {
    pub fn new(
        registry: Arc<SessionRegistry>,
        clock: Arc<dyn Clock>,
        tick_interval: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            registry,
            clock,
            entries: Mutex::new(HashMap::new()),
            tick_interval,
            cancellation_token,
        }
    }

    /// Register an activation time for a session.
    pub fn add(&self, session_id: impl Into<String>, at: DateTime<Utc>) {
        let session_id = session_id.into();
        info!(session_id = %session_id, at = %at.to_rfc3339(), "scheduling activation");
        self.entries.lock().insert(session_id, at);
    }

    /// Remove a pending activation. Returns whether an entry existed.
    pub fn cancel(&self, session_id: &str) -> bool {
        self.entries.lock().remove(session_id).is_some()
    }

    /// Number of pending activations.
    pub fn pending(&self) -> usize {
        self.entries.lock().len()
    }

    /// Run the tick loop until cancelled.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                _ = self.cancellation_token.cancelled() => {
                    debug!("scheduler stopped");
                    break;
                }
            }
        }
    }

    /// Fire activation for every entry whose time has elapsed.
    ///
    /// Fired entries are removed regardless of delivery outcome; a session
    /// that is no longer Scheduled simply ignores the activation.
    pub async fn tick(&self) {
        let now = self.clock.now();
        let due: Vec<String> = {
            let mut entries = self.entries.lock();
            let due: Vec<String> = entries
                .iter()
                .filter(|(_, at)| **at <= now)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &due {
                entries.remove(id);
            }
            due
        };

        for session_id in due {
            match self.registry.get(&session_id) {
                Some(handle) => {
                    info!(session_id = %session_id, "activating scheduled session");
                    if let Err(e) = handle.activate().await {
                        warn!(session_id = %session_id, "activation failed: {e}");
                    }
                }
                None => {
                    debug!(session_id = %session_id, "scheduled session no longer registered");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionCommand, SessionHandle};
    use chrono::TimeDelta;
    use tokio::sync::mpsc;

    /// Manually-advanced clock for deterministic activation tests.
    struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        fn new(start: DateTime<Utc>) -> Self {
            Self {
                now: Mutex::new(start),
            }
        }

        fn advance(&self, delta: TimeDelta) {
            let mut now = self.now.lock();
            *now += delta;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock()
        }
    }

    fn registered_session(
        registry: &SessionRegistry,
        id: &str,
    ) -> mpsc::Receiver<SessionCommand> {
        let (tx, rx) = mpsc::channel(4);
        let handle = Arc::new(SessionHandle::new(
            id.to_string(),
            format!("session-{id}"),
            tx,
            CancellationToken::new(),
        ));
        registry.register(handle).unwrap();
        rx
    }

    #[tokio::test]
    async fn test_activation_fires_only_after_time_elapsed() {
        let registry = Arc::new(SessionRegistry::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let scheduler = Scheduler::new(
            Arc::clone(&registry),
            clock.clone(),
            DEFAULT_TICK_INTERVAL,
            CancellationToken::new(),
        );

        let mut rx = registered_session(&registry, "bc-1");
        scheduler.add("bc-1", clock.now() + TimeDelta::seconds(60));

        // Not due yet
        scheduler.tick().await;
        assert!(rx.try_recv().is_err());
        assert_eq!(scheduler.pending(), 1);

        // Due on the first tick at/after the activation time
        clock.advance(TimeDelta::seconds(61));
        scheduler.tick().await;
        assert!(matches!(rx.try_recv(), Ok(SessionCommand::Activate)));
        assert_eq!(scheduler.pending(), 0);

        // Fired entries do not fire again
        scheduler.tick().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cancel_removes_entry() {
        let registry = Arc::new(SessionRegistry::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let scheduler = Scheduler::new(
            Arc::clone(&registry),
            clock.clone(),
            DEFAULT_TICK_INTERVAL,
            CancellationToken::new(),
        );

        let mut rx = registered_session(&registry, "bc-1");
        scheduler.add("bc-1", clock.now() + TimeDelta::seconds(10));
        assert!(scheduler.cancel("bc-1"));
        assert!(!scheduler.cancel("bc-1"));

        clock.advance(TimeDelta::seconds(60));
        scheduler.tick().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unregistered_session_is_skipped() {
        let registry = Arc::new(SessionRegistry::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let scheduler = Scheduler::new(
            registry,
            clock.clone(),
            DEFAULT_TICK_INTERVAL,
            CancellationToken::new(),
        );

        scheduler.add("ghost", clock.now() - TimeDelta::seconds(1));
        scheduler.tick().await;
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn test_multiple_due_entries_fire_in_one_tick() {
        let registry = Arc::new(SessionRegistry::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let scheduler = Scheduler::new(
            Arc::clone(&registry),
            clock.clone(),
            DEFAULT_TICK_INTERVAL,
            CancellationToken::new(),
        );

        let mut rx1 = registered_session(&registry, "bc-1");
        let mut rx2 = registered_session(&registry, "bc-2");
        scheduler.add("bc-1", clock.now() + TimeDelta::seconds(5));
        scheduler.add("bc-2", clock.now() + TimeDelta::seconds(8));

        clock.advance(TimeDelta::seconds(10));
        scheduler.tick().await;
        assert!(matches!(rx1.try_recv(), Ok(SessionCommand::Activate)));
        assert!(matches!(rx2.try_recv(), Ok(SessionCommand::Activate)));
    }
}
