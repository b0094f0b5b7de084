//! Handle for communicating with a session runner.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::messages::{SessionCommand, SessionStatusSnapshot};
use crate::domain::ContentSource;
use crate::{Error, Result};

/// Mailbox capacity per session runner.
pub const MAILBOX_CAPACITY: usize = 32;

/// Cheap reference to a running session: identity plus the runner's mailbox.
///
/// Stored in the registry; all state mutation happens inside the runner.
pub struct SessionHandle {
    id: String,
    name: String,
    tx: mpsc::Sender<SessionCommand>,
    cancellation_token: CancellationToken,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl SessionHandle {
    pub(crate) fn new(
        id: String,
        name: String,
        tx: mpsc::Sender<SessionCommand>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            id,
            name,
            tx,
            cancellation_token,
            join: Mutex::new(None),
        }
    }

    pub(crate) fn set_join(&self, join: JoinHandle<()>) {
        *self.join.lock() = Some(join);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, command: SessionCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| Error::Other(format!("session runner for '{}' is gone", self.name)))
    }

    /// Activate a Scheduled session.
    pub async fn activate(&self) -> Result<()> {
        self.send(SessionCommand::Activate).await
    }

    /// Stop the session and wait for the acknowledgement.
    pub async fn stop(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Stop { reply }).await?;
        rx.await
            .map_err(|_| Error::Other("session runner dropped stop request".into()))?
    }

    /// Snapshot the session's current status.
    pub async fn status(&self, log_tail: usize) -> Result<SessionStatusSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Status { log_tail, reply }).await?;
        rx.await
            .map_err(|_| Error::Other("session runner dropped status request".into()))
    }

    /// Post a chat message.
    pub async fn send_chat(&self, text: impl Into<String>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::SendChat {
            text: text.into(),
            reply,
        })
        .await?;
        rx.await
            .map_err(|_| Error::Other("session runner dropped chat request".into()))?
    }

    /// Disable the broadcast's live chat.
    pub async fn disable_chat(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::DisableChat { reply }).await?;
        rx.await
            .map_err(|_| Error::Other("session runner dropped chat request".into()))?
    }

    /// Swap content for the next restart.
    pub async fn update_content(&self, content: ContentSource) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::UpdateContent { content, reply })
            .await?;
        rx.await
            .map_err(|_| Error::Other("session runner dropped update request".into()))?
    }

    /// Tear the runner down. Used when purging a terminal session.
    pub async fn purge(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Purge { reply }).await?;
        let _ = rx.await;
        Ok(())
    }

    /// Cancel the runner's supervisory loop (process shutdown path).
    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    /// Wait for the runner task to finish, bounded by `timeout`.
    pub async fn join(&self, timeout: Duration) {
        let join = self.join.lock().take();
        if let Some(join) = join {
            if tokio::time::timeout(timeout, join).await.is_err() {
                warn!(session = %self.name, "session runner did not finish within grace period");
            }
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}
