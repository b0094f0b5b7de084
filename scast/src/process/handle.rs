//! Push process handle.
//!
//! Wraps one external media-push process as an owned resource with spawn,
//! liveness, activity, and bounded-grace termination operations.

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, trace, warn};

use super::command::PushCommand;
use crate::{Error, Result};

/// An owned external push process.
///
/// The process is spawned with stderr piped; a reader task consumes the
/// output and timestamps every line as forward-progress activity for the
/// health monitor. The child is killed on drop so a session-terminal
/// transition can never leak a process.
pub struct PushProcessHandle {
    target_url: String,
    child: Child,
    last_activity: Arc<RwLock<Instant>>,
    spawned_at: Instant,
}

impl PushProcessHandle {
    /// Spawn the given command targeting `target_url`.
    pub fn spawn(command: &PushCommand, target_url: impl Into<String>) -> Result<Self> {
        let target_url = target_url.into();

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ProcessLaunch(format!("{}: {e}", command.program)))?;

        let now = Instant::now();
        let last_activity = Arc::new(RwLock::new(now));

        if let Some(stderr) = child.stderr.take() {
            let activity = Arc::clone(&last_activity);
            let url = target_url.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    *activity.write() = Instant::now();
                    if line.contains("Error") || line.contains("error") {
                        warn!(target_url = %url, "push process: {line}");
                    } else {
                        trace!(target_url = %url, "push process: {line}");
                    }
                }
                debug!(target_url = %url, "push process output ended");
            });
        }

        Ok(Self {
            target_url,
            child,
            last_activity,
            spawned_at: now,
        })
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    /// OS process id, if the process has not been reaped yet.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Check liveness without blocking.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// The exit code, when the process has exited.
    pub fn exit_code(&mut self) -> Option<i32> {
        match self.child.try_wait() {
            Ok(Some(status)) => status.code().or(Some(-1)),
            _ => None,
        }
    }

    /// Time since the last observed output line (or since spawn).
    pub fn activity_elapsed(&self) -> Duration {
        self.last_activity.read().elapsed()
    }

    /// Time since the process was spawned.
    pub fn uptime(&self) -> Duration {
        self.spawned_at.elapsed()
    }

    /// Terminate the process: ask politely, wait up to `grace`, then kill.
    ///
    /// On unix the polite ask is SIGTERM, letting ffmpeg flush its output;
    /// elsewhere the process is killed outright.
    pub async fn terminate(&mut self, grace: Duration) {
        if !self.is_alive() {
            return;
        }

        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }
            if tokio::time::timeout(grace, self.child.wait()).await.is_ok() {
                debug!(target_url = %self.target_url, "push process exited within grace period");
                return;
            }
            warn!(target_url = %self.target_url, "push process ignored SIGTERM, killing");
        }

        #[cfg(not(unix))]
        let _ = grace;

        if let Err(e) = self.child.kill().await {
            warn!(target_url = %self.target_url, "failed to kill push process: {e}");
        }
    }
}

impl std::fmt::Debug for PushProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushProcessHandle")
            .field("target_url", &self.target_url)
            .field("pid", &self.child.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sleep_command(secs: u32) -> PushCommand {
        PushCommand::new("sleep", vec![secs.to_string()])
    }

    #[tokio::test]
    async fn test_spawn_and_liveness() {
        let mut handle = PushProcessHandle::spawn(&sleep_command(30), "rtmp://t/a").unwrap();
        assert!(handle.is_alive());
        assert!(handle.exit_code().is_none());
        handle.terminate(Duration::from_millis(500)).await;
        assert!(!handle.is_alive());
    }

    #[tokio::test]
    async fn test_exit_code_of_finished_process() {
        let command = PushCommand::new("sh", vec!["-c".into(), "exit 3".into()]);
        let mut handle = PushProcessHandle::spawn(&command, "rtmp://t/a").unwrap();

        // Give the process time to exit
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!handle.is_alive());
        assert_eq!(handle.exit_code(), Some(3));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_process_launch_error() {
        let command = PushCommand::new("/nonexistent/push-binary", vec![]);
        let result = PushProcessHandle::spawn(&command, "rtmp://t/a");
        assert!(matches!(result, Err(Error::ProcessLaunch(_))));
    }

    #[tokio::test]
    async fn test_terminate_idempotent() {
        let mut handle = PushProcessHandle::spawn(&sleep_command(30), "rtmp://t/a").unwrap();
        handle.terminate(Duration::from_millis(500)).await;
        // Second terminate on a dead process is a no-op
        handle.terminate(Duration::from_millis(500)).await;
        assert!(!handle.is_alive());
    }
}
