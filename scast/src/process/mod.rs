//! Push process management: command construction, process handles, and the
//! launcher seam used to inject fake processes in tests.

pub mod command;
pub mod handle;

pub use command::{PushCommand, build_push_args};
pub use handle::PushProcessHandle;

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use crate::Result;
use crate::domain::{ContentSource, SessionConfig};

/// Launches push processes for a session's ingestion targets.
#[async_trait]
pub trait PushLauncher: Send + Sync {
    /// Launch one push process feeding `target_url` from `content`.
    async fn launch(
        &self,
        config: &SessionConfig,
        content: &ContentSource,
        target_url: &str,
    ) -> Result<PushProcessHandle>;
}

/// Production launcher invoking the ffmpeg binary.
pub struct FfmpegLauncher {
    binary_path: String,
}

impl FfmpegLauncher {
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Detect the installed ffmpeg version, if the binary is reachable.
    pub fn detect_version(&self) -> Option<String> {
        std::process::Command::new(&self.binary_path)
            .arg("-version")
            .output()
            .ok()
            .and_then(|output| {
                String::from_utf8(output.stdout)
                    .ok()
                    .and_then(|s| s.lines().next().map(|l| l.to_string()))
            })
    }

    pub fn is_available(&self) -> bool {
        self.detect_version().is_some()
    }
}

impl Default for FfmpegLauncher {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl PushLauncher for FfmpegLauncher {
    async fn launch(
        &self,
        config: &SessionConfig,
        content: &ContentSource,
        target_url: &str,
    ) -> Result<PushProcessHandle> {
        let command = PushCommand::new(
            self.binary_path.clone(),
            build_push_args(config, content, target_url),
        );
        info!(session = %config.name, target_url, "launching push process: {command}");
        PushProcessHandle::spawn(&command, target_url)
    }
}

/// One (content -> ingestion URL) push relationship within a session.
///
/// Child streams start and stop together with their session but are tracked
/// independently for health purposes.
#[derive(Debug)]
pub struct ChildStream {
    pub handle: PushProcessHandle,
    pub primary: bool,
    /// Whether this child's failure has already been notified, so a dead
    /// secondary is reported once rather than on every sample.
    pub failure_notified: bool,
}

impl ChildStream {
    pub fn new(handle: PushProcessHandle, primary: bool) -> Self {
        Self {
            handle,
            primary,
            failure_notified: false,
        }
    }

    pub fn target_url(&self) -> &str {
        self.handle.target_url()
    }

    /// Terminate the underlying process with the given grace period.
    pub async fn terminate(&mut self, grace: Duration) {
        self.handle.terminate(grace).await;
    }
}
