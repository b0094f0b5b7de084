//! Orchestrator facade.
//!
//! The only entry point used by callers: create/stop/schedule/status/chat/
//! list operations, delegating to the registry and the per-session runners.
//! Owns the registry, the scheduler, and the notifier for its whole lifetime.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::AppConfig;
use crate::domain::{ContentSource, Session, SessionConfig, SessionState};
use crate::notification::{Notifier, NotifierHandle, SessionEvent, SessionEventKind};
use crate::process::{FfmpegLauncher, PushLauncher};
use crate::registry::SessionRegistry;
use crate::remote::{AnalyticsSnapshot, BroadcastPlatform, YouTubeClient};
use crate::scheduler::{Clock, Scheduler, SystemClock};
use crate::session::{RunnerDeps, SessionHandle, SessionRunner, SessionStatusSnapshot, SessionSummary};
use crate::{Error, Result};

/// Timeout for collecting one session's snapshot during `list()`.
const LIST_SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(2);

/// Extra slack on top of the push-process grace when joining runners.
const JOIN_SLACK: Duration = Duration::from_secs(2);

/// Full status payload returned by `status()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    #[serde(flatten)]
    pub snapshot: SessionStatusSnapshot,
    pub analytics: AnalyticsSnapshot,
}

/// The session orchestrator.
pub struct Orchestrator {
    config: AppConfig,
    registry: Arc<SessionRegistry>,
    scheduler: Arc<Scheduler>,
    platform: Arc<dyn BroadcastPlatform>,
    launcher: Arc<dyn PushLauncher>,
    notifier: NotifierHandle,
    cancellation_token: CancellationToken,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Build an orchestrator against the real platform and push binary.
    ///
    /// Must be called within a tokio runtime; the notifier and scheduler
    /// loops are spawned here.
    pub fn new(config: AppConfig) -> Result<Self> {
        let oauth = config
            .oauth
            .clone()
            .ok_or_else(|| Error::config("OAuth credentials are required"))?;
        let platform = Arc::new(YouTubeClient::new(oauth));
        let launcher = Arc::new(FfmpegLauncher::new(config.push_binary.clone()));
        Ok(Self::with_collaborators(
            config,
            platform,
            launcher,
            Arc::new(SystemClock),
        ))
    }

    /// Build an orchestrator with injected collaborators (used by tests and
    /// alternative platform/push implementations).
    pub fn with_collaborators(
        config: AppConfig,
        platform: Arc<dyn BroadcastPlatform>,
        launcher: Arc<dyn PushLauncher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cancellation_token = CancellationToken::new();
        let registry = Arc::new(SessionRegistry::new());

        let (notifier, notifier_handle) =
            Notifier::from_configs(&config.channels, cancellation_token.clone());
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&registry),
            clock,
            config.scheduler_tick,
            cancellation_token.clone(),
        ));

        let mut background = Vec::new();
        background.push(tokio::spawn(notifier.run()));
        background.push(tokio::spawn(Arc::clone(&scheduler).run()));

        Self {
            config,
            registry,
            scheduler,
            platform,
            launcher,
            notifier: notifier_handle,
            cancellation_token,
            background: Mutex::new(background),
        }
    }

    fn runner_deps(&self) -> RunnerDeps {
        RunnerDeps {
            platform: Arc::clone(&self.platform),
            launcher: Arc::clone(&self.launcher),
            notifier: self.notifier.clone(),
            monitor_config: self.config.monitor.clone(),
            shutdown_grace: self.config.shutdown_grace,
        }
    }

    /// Handle used to observe emitted events (e.g. for tests or metrics).
    pub fn notifier(&self) -> &NotifierHandle {
        &self.notifier
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Start a session immediately. A config carrying a scheduled start time
    /// is delegated to `schedule`.
    pub async fn start(&self, config: SessionConfig) -> Result<String> {
        if config.scheduled_start.is_some() {
            return self.schedule(config).await;
        }
        config.validate()?;
        self.spawn_session(config, SessionState::Starting).await
    }

    /// Register a session for future activation.
    pub async fn schedule(&self, config: SessionConfig) -> Result<String> {
        config.validate()?;
        let scheduled_start = config.scheduled_start.ok_or_else(|| {
            Error::validation("scheduled_start is required for scheduling")
        })?;

        let id = self
            .spawn_session(config, SessionState::Scheduled)
            .await?;
        self.scheduler.add(id.clone(), scheduled_start);

        if let Some(handle) = self.registry.get(&id) {
            self.notifier.emit(SessionEvent::new(
                SessionEventKind::Scheduled,
                id.clone(),
                handle.name().to_string(),
                format!(
                    "Broadcast {id} scheduled for {}.",
                    scheduled_start.to_rfc3339()
                ),
            ));
        }
        Ok(id)
    }

    /// Create the broadcast, spawn the runner, and register the session.
    async fn spawn_session(
        &self,
        config: SessionConfig,
        initial_state: SessionState,
    ) -> Result<String> {
        if self.registry.contains_name(&config.name) {
            return Err(Error::DuplicateName {
                name: config.name.clone(),
            });
        }

        let id = self
            .platform
            .create_broadcast(
                &config.title,
                &config.description,
                config.privacy,
                config.scheduled_start,
            )
            .await?;

        let session = Session::new(
            id.clone(),
            config,
            self.config.reconnect.clone(),
            initial_state,
            self.config.log_capacity,
        );
        let handle = SessionRunner::spawn(session, self.runner_deps(), &self.cancellation_token);

        if let Err(e) = self.registry.register(Arc::clone(&handle)) {
            // Lost a registration race; tear the runner down again
            handle.cancel();
            return Err(e);
        }

        info!(session_id = %id, "session registered");
        Ok(id)
    }

    /// Stop a session. Idempotent for already-terminal sessions.
    pub async fn stop(&self, id: &str) -> Result<()> {
        let handle = self.lookup(id)?;
        self.scheduler.cancel(id);
        handle.stop().await
    }

    /// Full status: runner snapshot plus a best-effort analytics fetch.
    pub async fn status(&self, id: &str) -> Result<SessionStatus> {
        let handle = self.lookup(id)?;
        let snapshot = handle.status(self.config.status_log_tail).await?;
        let analytics = self.fetch_analytics(&snapshot).await;
        Ok(SessionStatus { snapshot, analytics })
    }

    async fn fetch_analytics(&self, snapshot: &SessionStatusSnapshot) -> AnalyticsSnapshot {
        let mut analytics = AnalyticsSnapshot::default();

        if let Ok(stats) = self.platform.broadcast_stats(&snapshot.id).await {
            analytics.concurrent_viewers = stats.concurrent_viewers;
            analytics.lifecycle_status = stats.lifecycle_status;
        }
        if let Some(stream_id) = &snapshot.stream_id {
            if let Ok(health) = self.platform.stream_health(stream_id).await {
                analytics.health_status = Some(health.health);
            }
        }
        analytics
    }

    /// Summaries of every registered session.
    pub async fn list(&self) -> Vec<SessionSummary> {
        let mut summaries = Vec::new();
        for handle in self.registry.list() {
            let status = tokio::time::timeout(
                LIST_SNAPSHOT_TIMEOUT,
                handle.status(0),
            )
            .await;
            if let Ok(Ok(snapshot)) = status {
                summaries.push(SessionSummary::from(&snapshot));
            }
        }
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        summaries
    }

    /// Post a message to the session's live chat.
    pub async fn send_chat(&self, id: &str, text: &str) -> Result<()> {
        self.lookup(id)?.send_chat(text).await
    }

    /// Disable the session's live chat.
    pub async fn disable_chat(&self, id: &str) -> Result<()> {
        self.lookup(id)?.disable_chat().await
    }

    /// Swap the content source for the session's next restart.
    pub async fn update_content(&self, id: &str, content: ContentSource) -> Result<()> {
        self.lookup(id)?.update_content(content).await
    }

    /// Remove a terminal session from the registry.
    pub async fn purge(&self, id: &str) -> Result<()> {
        let handle = self.lookup(id)?;
        let snapshot = handle.status(0).await?;
        if !snapshot.state.is_terminal() {
            return Err(Error::validation(format!(
                "session '{}' is {}; stop it before purging",
                snapshot.name, snapshot.state
            )));
        }
        handle.purge().await?;
        self.registry.remove(id);
        Ok(())
    }

    fn lookup(&self, id: &str) -> Result<Arc<SessionHandle>> {
        self.registry
            .get(id)
            .ok_or_else(|| Error::not_found("session", id))
    }

    /// Graceful shutdown: cancel every loop, then wait for each session
    /// runner to terminate its push processes within the grace period.
    pub async fn shutdown(&self) {
        info!("orchestrator shutting down");
        self.cancellation_token.cancel();

        let join_timeout = self.config.shutdown_grace + JOIN_SLACK;
        for handle in self.registry.list() {
            handle.join(join_timeout).await;
        }

        let background = std::mem::take(&mut *self.background.lock());
        for task in background {
            let _ = task.await;
        }
    }
}
