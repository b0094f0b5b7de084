//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("A session named '{name}' already exists")]
    DuplicateName { name: String },

    #[error("Remote API error: {message}")]
    RemoteApi { message: String, transient: bool },

    #[error("Failed to launch push process: {0}")]
    ProcessLaunch(String),

    #[error("Health check timed out after {timeout_ms}ms")]
    HealthCheckTimeout { timeout_ms: u64 },

    #[error("Reconnect retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn remote_transient(msg: impl Into<String>) -> Self {
        Self::RemoteApi {
            message: msg.into(),
            transient: true,
        }
    }

    pub fn remote_permanent(msg: impl Into<String>) -> Self {
        Self::RemoteApi {
            message: msg.into(),
            transient: false,
        }
    }

    /// Check whether retrying the failed operation could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RemoteApi { transient, .. } => *transient,
            Self::ProcessLaunch(_) | Self::HealthCheckTimeout { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::remote_transient("503").is_transient());
        assert!(!Error::remote_permanent("403").is_transient());
        assert!(Error::ProcessLaunch("spawn failed".into()).is_transient());
        assert!(!Error::validation("bad bitrate").is_transient());
    }

    #[test]
    fn test_display() {
        let err = Error::DuplicateName {
            name: "demo".into(),
        };
        assert_eq!(err.to_string(), "A session named 'demo' already exists");
    }
}
