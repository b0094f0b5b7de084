//! Remote broadcast platform interface.
//!
//! The orchestrator consumes the platform only through the
//! [`BroadcastPlatform`] trait; one production implementation talks to
//! YouTube Live. Errors are classified transient (retryable) or permanent.

pub mod youtube;

pub use youtube::{OAuthConfig, YouTubeClient};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::domain::Privacy;

/// Remote broadcast lifecycle phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastLifecycle {
    Testing,
    Live,
    Complete,
}

impl BroadcastLifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Testing => "testing",
            Self::Live => "live",
            Self::Complete => "complete",
        }
    }
}

/// A platform stream bound to a broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamBinding {
    pub stream_id: String,
    /// Complete ingestion URL (address + stream key).
    pub ingestion_url: String,
}

/// Platform-reported stream health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamHealth {
    pub status: String,
    pub health: String,
    #[serde(default)]
    pub configuration_issues: String,
}

/// Basic broadcast analytics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BroadcastStats {
    pub concurrent_viewers: Option<u64>,
    pub lifecycle_status: Option<String>,
}

/// Analytics snapshot surfaced through `status()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub concurrent_viewers: Option<u64>,
    pub health_status: Option<String>,
    pub lifecycle_status: Option<String>,
}

/// Operations the orchestrator needs from a remote broadcast platform.
#[async_trait]
pub trait BroadcastPlatform: Send + Sync {
    /// Create a broadcast and return its id.
    async fn create_broadcast(
        &self,
        title: &str,
        description: &str,
        privacy: Privacy,
        scheduled_start: Option<DateTime<Utc>>,
    ) -> Result<String>;

    /// Create an ingestion stream for the given CDN settings.
    async fn create_stream(
        &self,
        name: &str,
        resolution: &str,
        bitrate: &str,
    ) -> Result<StreamBinding>;

    /// Bind a stream to a broadcast.
    async fn bind(&self, broadcast_id: &str, stream_id: &str) -> Result<()>;

    /// Move the broadcast through its lifecycle.
    async fn transition(&self, broadcast_id: &str, status: BroadcastLifecycle) -> Result<()>;

    /// Platform-side stream health.
    async fn stream_health(&self, stream_id: &str) -> Result<StreamHealth>;

    /// Basic broadcast analytics.
    async fn broadcast_stats(&self, broadcast_id: &str) -> Result<BroadcastStats>;

    /// The broadcast's live chat id, when chat is available.
    async fn live_chat_id(&self, broadcast_id: &str) -> Result<Option<String>>;

    /// Post a message to a live chat.
    async fn send_chat_message(&self, live_chat_id: &str, text: &str) -> Result<()>;

    /// Disable the broadcast's live chat.
    async fn disable_chat(&self, broadcast_id: &str) -> Result<()>;
}
