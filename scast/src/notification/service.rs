//! Notification service.
//!
//! Session runners emit events onto an outbound queue; this service consumes
//! the queue and fans each event out to the configured channels. Delivery is
//! best-effort: a full queue or a failing transport is logged and dropped,
//! never surfaced back into the state machine.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::channels::{ChannelConfig, EmailChannel, NotificationChannel, WebhookChannel};
use super::events::SessionEvent;

/// Default capacity of the outbound event queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Capacity of the observer broadcast channel.
const OBSERVER_CAPACITY: usize = 256;

/// Cheap cloneable handle used by session runners to emit events.
#[derive(Clone)]
pub struct NotifierHandle {
    tx: mpsc::Sender<SessionEvent>,
    observers: broadcast::Sender<SessionEvent>,
}

impl NotifierHandle {
    /// Enqueue an event. Never blocks; a full or closed queue drops the
    /// event with a warning.
    pub fn emit(&self, event: SessionEvent) {
        if let Err(e) = self.tx.try_send(event) {
            warn!("dropping notification event: {e}");
        }
    }

    /// Observe every event passing through the notifier.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.observers.subscribe()
    }
}

/// Consumes the event queue and dispatches to channels.
pub struct Notifier {
    rx: mpsc::Receiver<SessionEvent>,
    observers: broadcast::Sender<SessionEvent>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    cancellation_token: CancellationToken,
}

impl Notifier {
    /// Build a notifier and its emit handle from channel configurations.
    pub fn from_configs(
        configs: &[ChannelConfig],
        cancellation_token: CancellationToken,
    ) -> (Self, NotifierHandle) {
        let channels: Vec<Arc<dyn NotificationChannel>> = configs
            .iter()
            .filter(|c| c.is_enabled())
            .map(|c| match c {
                ChannelConfig::Webhook(cfg) => {
                    Arc::new(WebhookChannel::new(cfg.clone())) as Arc<dyn NotificationChannel>
                }
                ChannelConfig::Email(cfg) => {
                    Arc::new(EmailChannel::new(cfg.clone())) as Arc<dyn NotificationChannel>
                }
            })
            .collect();
        Self::with_channels(channels, cancellation_token)
    }

    /// Build a notifier from already-constructed channels.
    pub fn with_channels(
        channels: Vec<Arc<dyn NotificationChannel>>,
        cancellation_token: CancellationToken,
    ) -> (Self, NotifierHandle) {
        let (tx, rx) = mpsc::channel(DEFAULT_QUEUE_CAPACITY);
        let (observers, _) = broadcast::channel(OBSERVER_CAPACITY);

        let handle = NotifierHandle {
            tx,
            observers: observers.clone(),
        };
        let notifier = Self {
            rx,
            observers,
            channels,
            cancellation_token,
        };
        (notifier, handle)
    }

    /// Run until the queue closes or the token is cancelled.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                maybe_event = self.rx.recv() => {
                    match maybe_event {
                        Some(event) => self.dispatch(event).await,
                        None => break,
                    }
                }
                _ = self.cancellation_token.cancelled() => {
                    // Drain whatever is already queued, then exit
                    while let Ok(event) = self.rx.try_recv() {
                        self.dispatch(event).await;
                    }
                    break;
                }
            }
        }
        debug!("notifier stopped");
    }

    async fn dispatch(&self, event: SessionEvent) {
        let _ = self.observers.send(event.clone());

        for channel in &self.channels {
            if !channel.is_enabled() {
                continue;
            }
            if let Err(e) = channel.send(&event).await {
                warn!(
                    channel = channel.channel_type(),
                    kind = %event.kind,
                    "notification delivery failed: {e}"
                );
            }
        }
    }
}
