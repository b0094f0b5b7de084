//! Domain model: session entity, state machine, and value objects.

pub mod session;
pub mod value_objects;

pub use session::{ContentSource, Privacy, Session, SessionConfig, SessionState};
pub use value_objects::{LogBuffer, LogEntry, ReconnectDecision, ReconnectPolicy};
