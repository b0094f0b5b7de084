//! Session runner: the per-session supervisory loop.
//!
//! One runner task owns each session. It is the session's single writer:
//! state transitions, health sampling, reconnect timers, and process
//! lifecycle all happen here, driven by a `select!` loop over the command
//! mailbox, the sample timer, the reconnect timer, and the shutdown token.
//! Terminal sessions stay parked (mailbox only) so status and logs remain
//! inspectable until the session is purged.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::handle::{MAILBOX_CAPACITY, SessionHandle};
use super::messages::{SessionCommand, SessionStatusSnapshot};
use crate::domain::{ReconnectDecision, Session, SessionState};
use crate::monitor::{HealthMonitor, HealthSample, HealthVerdict, MonitorConfig};
use crate::notification::{NotifierHandle, SessionEvent, SessionEventKind};
use crate::process::{ChildStream, PushLauncher};
use crate::remote::{BroadcastLifecycle, BroadcastPlatform};
use crate::{Error, Result};

/// Message posted to the live chat when a session first goes live.
const CHAT_CONNECTED_MESSAGE: &str = "Streaming bot connected.";

/// Shared collaborators injected into every runner.
#[derive(Clone)]
pub struct RunnerDeps {
    pub platform: Arc<dyn BroadcastPlatform>,
    pub launcher: Arc<dyn PushLauncher>,
    pub notifier: NotifierHandle,
    pub monitor_config: MonitorConfig,
    /// Grace period for terminating push processes.
    pub shutdown_grace: Duration,
}

/// The per-session supervisory loop.
pub struct SessionRunner {
    session: Session,
    children: Vec<ChildStream>,
    monitor: HealthMonitor,
    platform: Arc<dyn BroadcastPlatform>,
    launcher: Arc<dyn PushLauncher>,
    notifier: NotifierHandle,
    mailbox: mpsc::Receiver<SessionCommand>,
    cancellation_token: CancellationToken,
    shutdown_grace: Duration,
    /// When the pending reconnect timer fires, if one is armed.
    reconnect_at: Option<Instant>,
    /// Next health sample time.
    next_sample_at: Instant,
    /// When the current Starting/Reconnecting attempt began.
    phase_started_at: Instant,
    /// Consecutive healthy samples since the session (re-)entered Live.
    healthy_streak: u32,
}

impl SessionRunner {
    /// Spawn a runner for `session` and return its handle.
    ///
    /// The runner uses a child token of `parent_token`, so cancelling the
    /// parent shuts every session down.
    pub fn spawn(session: Session, deps: RunnerDeps, parent_token: &CancellationToken) -> Arc<SessionHandle> {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let cancellation_token = parent_token.child_token();

        let handle = Arc::new(SessionHandle::new(
            session.id.clone(),
            session.name.clone(),
            tx,
            cancellation_token.clone(),
        ));

        let sample_interval = deps.monitor_config.sample_interval;
        let runner = Self {
            monitor: HealthMonitor::new(deps.monitor_config),
            session,
            children: Vec::new(),
            platform: deps.platform,
            launcher: deps.launcher,
            notifier: deps.notifier,
            mailbox: rx,
            cancellation_token,
            shutdown_grace: deps.shutdown_grace,
            reconnect_at: None,
            next_sample_at: Instant::now() + sample_interval,
            phase_started_at: Instant::now(),
            healthy_streak: 0,
        };

        let join = tokio::spawn(runner.run());
        handle.set_join(join);
        handle
    }

    /// Sleep until the given instant, or forever when none is set.
    async fn sleep_until_opt(at: Option<Instant>) {
        match at {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    }

    async fn run(mut self) {
        info!(session = %self.session.name, id = %self.session.id, "session runner starting");

        if self.session.state() == SessionState::Starting {
            self.begin_start().await;
        }

        loop {
            let reconnect_at = self.reconnect_at;
            // No sampling while a reconnect timer is pending: the processes
            // are known-dead and a sample would only re-arm the timer
            let sample_at = if self.session.state().is_monitored() && reconnect_at.is_none() {
                Some(self.next_sample_at)
            } else {
                None
            };

            tokio::select! {
                biased;

                maybe_command = self.mailbox.recv() => {
                    match maybe_command {
                        Some(command) => {
                            if self.handle_command(command).await {
                                break;
                            }
                        }
                        None => {
                            if !self.session.state().is_terminal() {
                                warn!(session = %self.session.name, "mailbox closed, stopping session");
                                let _ = self.do_stop("orchestrator went away").await;
                            }
                            break;
                        }
                    }
                }

                _ = self.cancellation_token.cancelled() => {
                    self.shutdown().await;
                    break;
                }

                _ = Self::sleep_until_opt(reconnect_at) => {
                    self.reconnect_at = None;
                    self.attempt_reconnect().await;
                }

                _ = Self::sleep_until_opt(sample_at) => {
                    self.next_sample_at = Instant::now() + self.monitor.config().sample_interval;
                    self.on_sample().await;
                }
            }
        }

        debug!(session = %self.session.name, "session runner finished");
    }

    /// Handle one mailbox command. Returns `true` when the runner must exit.
    async fn handle_command(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::Activate => {
                if self.session.state() == SessionState::Scheduled {
                    self.emit(SessionEventKind::Activated, "Scheduled session activated.");
                    if self.session.transition_to(SessionState::Starting).is_ok() {
                        self.begin_start().await;
                    }
                } else {
                    debug!(
                        session = %self.session.name,
                        state = %self.session.state(),
                        "ignoring activation outside Scheduled"
                    );
                }
                false
            }
            SessionCommand::Stop { reply } => {
                let result = self.do_stop("manual stop").await;
                let _ = reply.send(result);
                false
            }
            SessionCommand::Status { log_tail, reply } => {
                let _ = reply.send(self.snapshot(log_tail));
                false
            }
            SessionCommand::SendChat { text, reply } => {
                let result = match &self.session.live_chat_id {
                    Some(chat_id) => self.platform.send_chat_message(chat_id, &text).await,
                    None => Err(Error::Validation("session has no live chat".into())),
                };
                let _ = reply.send(result);
                false
            }
            SessionCommand::DisableChat { reply } => {
                let result = self.platform.disable_chat(&self.session.id).await;
                if result.is_ok() {
                    self.session.live_chat_id = None;
                    self.session.logs.push("Live chat disabled.");
                }
                let _ = reply.send(result);
                false
            }
            SessionCommand::UpdateContent { content, reply } => {
                self.session
                    .logs
                    .push(format!("Content updated for next restart: {}", content.source));
                self.session.pending_content = Some(content);
                let _ = reply.send(Ok(()));
                false
            }
            SessionCommand::Purge { reply } => {
                if !self.session.state().is_terminal() {
                    let _ = self.do_stop("purged").await;
                }
                let _ = reply.send(());
                true
            }
        }
    }

    /// Bind the broadcast to a fresh stream and launch the push processes.
    ///
    /// The broadcast itself already exists; it was created by the facade so
    /// the session could be registered under its id.
    async fn begin_start(&mut self) {
        self.phase_started_at = Instant::now();

        let binding = match self
            .platform
            .create_stream(
                &self.session.name,
                &self.session.config.resolution,
                &self.session.config.bitrate,
            )
            .await
        {
            Ok(binding) => binding,
            Err(e) => {
                self.fail_session(
                    format!("stream creation failed: {e}"),
                    SessionEventKind::Failed,
                )
                .await;
                return;
            }
        };

        if let Err(e) = self.platform.bind(&self.session.id, &binding.stream_id).await {
            self.fail_session(
                format!("stream binding failed: {e}"),
                SessionEventKind::Failed,
            )
            .await;
            return;
        }

        self.session.stream_id = Some(binding.stream_id);
        self.session.ingestion_url = Some(binding.ingestion_url.clone());
        self.session
            .logs
            .push("Session configured and bound.");

        match self.platform.live_chat_id(&self.session.id).await {
            Ok(chat_id) => self.session.live_chat_id = chat_id,
            Err(e) => warn!(session = %self.session.name, "live chat lookup failed: {e}"),
        }

        self.emit(
            SessionEventKind::Configured,
            format!(
                "Broadcast {} is ready with ingestion {}.",
                self.session.id, binding.ingestion_url
            ),
        );

        if let Err(e) = self.launch_children().await {
            self.fail_session(format!("launch failed: {e}"), SessionEventKind::Failed)
                .await;
            return;
        }

        self.monitor.reset();
        // First sample decides Starting -> Live; schedule it promptly
        self.next_sample_at = Instant::now() + self.monitor.config().sample_interval;
    }

    /// Launch one push process per ingestion target, primary first.
    ///
    /// A primary launch failure is an error; a secondary failure is logged
    /// and notified but does not abort the launch.
    async fn launch_children(&mut self) -> Result<()> {
        let targets = self.session.ingestion_targets();
        let content = self.session.effective_content().clone();
        let mut children = Vec::with_capacity(targets.len());

        for (index, target) in targets.iter().enumerate() {
            let primary = index == 0;
            match self
                .launcher
                .launch(&self.session.config, &content, target)
                .await
            {
                Ok(handle) => {
                    self.session
                        .logs
                        .push(format!("Launched push process for {target}"));
                    children.push(ChildStream::new(handle, primary));
                }
                Err(e) if primary => {
                    self.children = children;
                    self.stop_children().await;
                    return Err(e);
                }
                Err(e) => {
                    self.session
                        .logs
                        .push(format!("Secondary push to {target} failed to launch: {e}"));
                    self.emit(
                        SessionEventKind::ChildStreamFailed,
                        format!("Push to {target} failed to launch: {e}"),
                    );
                }
            }
        }

        self.children = children;
        Ok(())
    }

    /// Take and act on one health sample.
    async fn on_sample(&mut self) {
        let sample = self.monitor.sample(&mut self.children);
        self.notify_failed_secondaries(&sample);

        match self.session.state() {
            SessionState::Starting => self.on_sample_starting(&sample).await,
            SessionState::Reconnecting => self.on_sample_reconnecting(&sample).await,
            SessionState::Live => self.on_sample_live(&sample).await,
            _ => {}
        }
    }

    async fn on_sample_starting(&mut self, sample: &HealthSample) {
        if sample.healthy {
            self.go_live(false).await;
            return;
        }

        let primary_exited = sample.primary().map(|p| !p.alive).unwrap_or(true);
        if primary_exited {
            self.fail_session(
                "push process exited before first successful health sample".to_string(),
                SessionEventKind::Failed,
            )
            .await;
        } else if self.phase_started_at.elapsed() > self.monitor.config().first_sample_deadline {
            let timeout_ms = self.monitor.config().first_sample_deadline.as_millis() as u64;
            self.fail_session(
                Error::HealthCheckTimeout { timeout_ms }.to_string(),
                SessionEventKind::Failed,
            )
            .await;
        }
        // Otherwise the process is alive but not yet healthy; keep waiting
    }

    async fn on_sample_reconnecting(&mut self, sample: &HealthSample) {
        if sample.healthy {
            self.go_live(true).await;
            return;
        }

        let primary_exited = sample.primary().map(|p| !p.alive).unwrap_or(true);
        let deadline_passed =
            self.phase_started_at.elapsed() > self.monitor.config().first_sample_deadline;
        if primary_exited || deadline_passed {
            let reason = sample
                .reason
                .clone()
                .unwrap_or_else(|| "restart attempt failed health check".to_string());
            self.attempt_failed(reason).await;
        }
    }

    async fn on_sample_live(&mut self, sample: &HealthSample) {
        match self.monitor.observe(sample) {
            HealthVerdict::Healthy => {
                self.healthy_streak += 1;
                if self.session.retry_count > 0
                    && self.healthy_streak >= self.monitor.config().stabilization_samples
                {
                    debug!(session = %self.session.name, "session stabilized, resetting retry counter");
                    self.session.logs.push("Session stabilized.");
                    self.session.retry_count = 0;
                }
            }
            HealthVerdict::Unhealthy { consecutive } => {
                self.healthy_streak = 0;
                debug!(
                    session = %self.session.name,
                    consecutive,
                    "unhealthy sample below debounce threshold"
                );
            }
            HealthVerdict::Degraded { reason } => {
                self.healthy_streak = 0;
                self.on_degraded(reason).await;
            }
        }
    }

    /// The debounce threshold was reached while Live.
    async fn on_degraded(&mut self, reason: String) {
        self.session.record_failure(reason.clone());
        if self.session.transition_to(SessionState::Degraded).is_err() {
            return;
        }
        self.emit(SessionEventKind::Degraded, reason);

        match self
            .session
            .reconnect_policy
            .decide(self.session.retry_count)
        {
            ReconnectDecision::Retry(delay) => {
                info!(
                    session = %self.session.name,
                    delay_ms = delay.as_millis() as u64,
                    "scheduling reconnect"
                );
                self.session
                    .logs
                    .push(format!("Reconnect scheduled in {}ms.", delay.as_millis()));
                self.reconnect_at = Some(Instant::now() + delay);
            }
            ReconnectDecision::GiveUp => {
                self.fail_session(
                    "max retries exceeded".to_string(),
                    SessionEventKind::RetriesExhausted,
                )
                .await;
            }
        }
    }

    /// The reconnect timer fired: make one restart attempt.
    async fn attempt_reconnect(&mut self) {
        if self.session.state().is_terminal() {
            return;
        }
        if self.session.transition_to(SessionState::Reconnecting).is_err() {
            return;
        }

        self.session.retry_count += 1;
        let attempt = self.session.retry_count;
        let max = self.session.reconnect_policy.max_retries;
        self.emit(
            SessionEventKind::Reconnecting,
            format!(
                "Health degraded for broadcast {}, attempt {attempt} of {max}.",
                self.session.id
            ),
        );

        self.stop_children().await;
        match self.launch_children().await {
            Ok(()) => {
                self.monitor.reset();
                self.phase_started_at = Instant::now();
                self.next_sample_at = Instant::now() + self.monitor.config().sample_interval;
            }
            Err(e) if e.is_transient() => {
                self.attempt_failed(format!("restart launch failed: {e}")).await;
            }
            Err(e) => {
                self.fail_session(
                    format!("restart launch failed: {e}"),
                    SessionEventKind::Failed,
                )
                .await;
            }
        }
    }

    /// A reconnect attempt failed; retry per policy or give up.
    async fn attempt_failed(&mut self, reason: String) {
        self.session.record_failure(reason.clone());

        match self
            .session
            .reconnect_policy
            .decide(self.session.retry_count)
        {
            ReconnectDecision::Retry(delay) => {
                info!(
                    session = %self.session.name,
                    delay_ms = delay.as_millis() as u64,
                    "reconnect attempt failed, scheduling another"
                );
                self.session
                    .logs
                    .push(format!("Reconnect scheduled in {}ms.", delay.as_millis()));
                self.reconnect_at = Some(Instant::now() + delay);
            }
            ReconnectDecision::GiveUp => {
                self.fail_session(
                    "max retries exceeded".to_string(),
                    SessionEventKind::RetriesExhausted,
                )
                .await;
            }
        }
    }

    /// First healthy sample observed; the session is live.
    async fn go_live(&mut self, recovered: bool) {
        if self.session.transition_to(SessionState::Live).is_err() {
            return;
        }
        self.healthy_streak = 0;

        if recovered {
            self.emit(
                SessionEventKind::Recovered,
                format!("Broadcast {} recovered and is live again.", self.session.id),
            );
            return;
        }

        // Lifecycle transition failures don't tear down a locally-healthy
        // session; the operator sees them via logs and notifications
        if let Err(e) = self
            .platform
            .transition(&self.session.id, BroadcastLifecycle::Live)
            .await
        {
            warn!(session = %self.session.name, "broadcast lifecycle transition failed: {e}");
            self.session
                .logs
                .push(format!("Broadcast transition to live failed: {e}"));
        }

        self.emit(
            SessionEventKind::Started,
            format!("Broadcast {} is now live.", self.session.id),
        );

        if let Some(chat_id) = self.session.live_chat_id.clone() {
            if let Err(e) = self
                .platform
                .send_chat_message(&chat_id, CHAT_CONNECTED_MESSAGE)
                .await
            {
                debug!(session = %self.session.name, "chat hello failed: {e}");
            }
        }
    }

    /// Stop on request. Idempotent for terminal sessions.
    async fn do_stop(&mut self, reason: &str) -> Result<()> {
        if self.session.state().is_terminal() {
            return Ok(());
        }

        self.reconnect_at = None;
        self.stop_children().await;

        if self.session.stream_id.is_some() {
            if let Err(e) = self
                .platform
                .transition(&self.session.id, BroadcastLifecycle::Complete)
                .await
            {
                warn!(session = %self.session.name, "broadcast completion failed: {e}");
            }
        }

        self.session.transition_to(SessionState::Stopped)?;
        self.emit(SessionEventKind::Stopped, reason.to_string());
        Ok(())
    }

    /// Move to Failed, releasing every process.
    async fn fail_session(&mut self, reason: String, kind: SessionEventKind) {
        self.reconnect_at = None;
        self.session.record_failure(reason.clone());
        self.stop_children().await;

        if self.session.transition_to(SessionState::Failed).is_err() {
            return;
        }
        self.emit(kind, reason);
    }

    /// Process-shutdown path: terminate children and park the session.
    async fn shutdown(&mut self) {
        info!(session = %self.session.name, "shutting down session runner");
        self.reconnect_at = None;
        self.stop_children().await;
        if !self.session.state().is_terminal() {
            let _ = self.session.transition_to(SessionState::Stopped);
            self.emit(SessionEventKind::Stopped, "process shutdown".to_string());
        }
    }

    async fn stop_children(&mut self) {
        for child in &mut self.children {
            child.terminate(self.shutdown_grace).await;
        }
        self.children.clear();
    }

    /// Notify each newly-failed secondary destination exactly once.
    fn notify_failed_secondaries(&mut self, sample: &HealthSample) {
        for (child, health) in self.children.iter_mut().zip(sample.children.iter()) {
            if !health.primary && !health.healthy && !child.failure_notified {
                child.failure_notified = true;
                self.session
                    .logs
                    .push(format!("Secondary push to {} failed.", health.target_url));
                self.notifier.emit(SessionEvent::new(
                    SessionEventKind::ChildStreamFailed,
                    self.session.id.clone(),
                    self.session.name.clone(),
                    format!("Push to {} failed.", health.target_url),
                ));
            }
        }
    }

    fn snapshot(&mut self, log_tail: usize) -> SessionStatusSnapshot {
        let children = self
            .monitor
            .sample(&mut self.children)
            .children;
        SessionStatusSnapshot {
            id: self.session.id.clone(),
            name: self.session.name.clone(),
            state: self.session.state(),
            stream_id: self.session.stream_id.clone(),
            retry_count: self.session.retry_count,
            last_failure: self.session.last_failure.clone(),
            children,
            recent_logs: self.session.logs.tail(log_tail),
            scheduled_start: self.session.config.scheduled_start,
            created_at: self.session.created_at,
            last_transition_at: self.session.last_transition_at,
        }
    }

    /// Append a log entry and emit a notification event for a transition.
    fn emit(&mut self, kind: SessionEventKind, message: impl Into<String>) {
        let message = message.into();
        self.session.logs.push(message.clone());
        self.notifier.emit(SessionEvent::new(
            kind,
            self.session.id.clone(),
            self.session.name.clone(),
            message,
        ));
    }
}
