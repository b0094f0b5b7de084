//! Session event notifications: events, channels, and the dispatch service.

pub mod channels;
pub mod events;
pub mod service;

pub use channels::{ChannelConfig, EmailConfig, NotificationChannel, WebhookConfig};
pub use events::{SessionEvent, SessionEventKind, Severity};
pub use service::{Notifier, NotifierHandle};
