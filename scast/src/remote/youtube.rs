//! YouTube Live platform client.
//!
//! Thin wrapper over the YouTube Data API v3 live-streaming endpoints,
//! authenticated with an OAuth refresh token. The client performs no retry
//! logic of its own; it only classifies failures as transient or permanent
//! for the reconnect policy upstream.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{BroadcastLifecycle, BroadcastPlatform, BroadcastStats, StreamBinding, StreamHealth};
use crate::domain::Privacy;
use crate::{Error, Result};

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Safety margin subtracted from the token lifetime before refreshing.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// OAuth credentials for the refresh-token grant.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// YouTube Data API client for live streaming operations.
pub struct YouTubeClient {
    http: reqwest::Client,
    oauth: OAuthConfig,
    api_base: String,
    token_url: String,
    token: Mutex<Option<CachedToken>>,
}

impl YouTubeClient {
    pub fn new(oauth: OAuthConfig) -> Self {
        Self::with_base_urls(oauth, API_BASE, TOKEN_URL)
    }

    /// Override endpoints, e.g. to point at a local stub server.
    pub fn with_base_urls(
        oauth: OAuthConfig,
        api_base: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            http,
            oauth,
            api_base: api_base.into(),
            token_url: token_url.into(),
            token: Mutex::new(None),
        }
    }

    /// Obtain a valid access token, refreshing through the OAuth token
    /// endpoint when the cached one is missing or about to expire.
    async fn access_token(&self) -> Result<String> {
        if let Some(cached) = self.token.lock().as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.access_token.clone());
            }
        }

        debug!("refreshing YouTube access token");
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.oauth.client_id.as_str()),
                ("client_secret", self.oauth.client_secret.as_str()),
                ("refresh_token", self.oauth.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| Error::remote_transient(format!("token refresh failed: {e}")))?;

        let response = Self::check_status(response).await?;
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::remote_transient(format!("invalid token response: {e}")))?;

        let access_token = token.access_token.clone();
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *self.token.lock() = Some(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + lifetime,
        });
        Ok(access_token)
    }

    /// Map HTTP status classes onto the transient/permanent error taxonomy.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = format!("{status}: {body}");
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Err(Error::remote_transient(message))
        } else {
            Err(Error::remote_permanent(message))
        }
    }

    async fn post_json(&self, url: &str, query: &[(&str, &str)], body: Value) -> Result<Value> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .query(query)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::remote_transient(e.to_string()))?;
        let response = Self::check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| Error::remote_transient(format!("invalid response body: {e}")))
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::remote_transient(e.to_string()))?;
        let response = Self::check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| Error::remote_transient(format!("invalid response body: {e}")))
    }

    fn str_at<'a>(value: &'a Value, pointer: &str) -> Result<&'a str> {
        value
            .pointer(pointer)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::remote_permanent(format!("missing field {pointer} in response")))
    }

    /// YouTube wants the frame-rate and resolution split out of shorthand
    /// like "1080p60".
    fn cdn_settings(resolution: &str) -> (String, &'static str) {
        if let Some(base) = resolution.strip_suffix("p60") {
            (format!("{base}p"), "60fps")
        } else {
            (resolution.to_string(), "30fps")
        }
    }
}

#[async_trait]
impl BroadcastPlatform for YouTubeClient {
    async fn create_broadcast(
        &self,
        title: &str,
        description: &str,
        privacy: Privacy,
        scheduled_start: Option<DateTime<Utc>>,
    ) -> Result<String> {
        let mut snippet = json!({
            "title": title,
            "description": description,
        });
        // The API requires a start time; "now" stands in for immediate starts
        let start = scheduled_start.unwrap_or_else(Utc::now);
        snippet["scheduledStartTime"] = json!(start.to_rfc3339());

        let body = json!({
            "snippet": snippet,
            "status": { "privacyStatus": privacy.as_str() },
            "contentDetails": { "enableAutoStart": false, "enableAutoStop": false },
        });

        let url = format!("{}/liveBroadcasts", self.api_base);
        let response = self
            .post_json(&url, &[("part", "snippet,status,contentDetails")], body)
            .await?;
        let id = Self::str_at(&response, "/id")?.to_string();
        info!(broadcast_id = %id, "created broadcast");
        Ok(id)
    }

    async fn create_stream(
        &self,
        name: &str,
        resolution: &str,
        bitrate: &str,
    ) -> Result<StreamBinding> {
        let (resolution, frame_rate) = Self::cdn_settings(resolution);
        let body = json!({
            "snippet": { "title": name },
            "cdn": {
                "frameRate": frame_rate,
                "ingestionType": "rtmp",
                "resolution": resolution,
                "bitrate": bitrate,
            },
        });

        let url = format!("{}/liveStreams", self.api_base);
        let response = self
            .post_json(&url, &[("part", "snippet,cdn,contentDetails,status")], body)
            .await?;

        let stream_id = Self::str_at(&response, "/id")?.to_string();
        let address = Self::str_at(&response, "/cdn/ingestionInfo/ingestionAddress")?;
        let stream_name = Self::str_at(&response, "/cdn/ingestionInfo/streamName")?;
        info!(stream_id = %stream_id, "created stream");

        Ok(StreamBinding {
            stream_id,
            ingestion_url: format!("{address}/{stream_name}"),
        })
    }

    async fn bind(&self, broadcast_id: &str, stream_id: &str) -> Result<()> {
        let url = format!("{}/liveBroadcasts/bind", self.api_base);
        self.post_json(
            &url,
            &[
                ("part", "id,contentDetails"),
                ("id", broadcast_id),
                ("streamId", stream_id),
            ],
            Value::Null,
        )
        .await?;
        info!(broadcast_id, stream_id, "bound broadcast to stream");
        Ok(())
    }

    async fn transition(&self, broadcast_id: &str, status: BroadcastLifecycle) -> Result<()> {
        let url = format!("{}/liveBroadcasts/transition", self.api_base);
        self.post_json(
            &url,
            &[
                ("part", "status"),
                ("id", broadcast_id),
                ("broadcastStatus", status.as_str()),
            ],
            Value::Null,
        )
        .await?;
        info!(broadcast_id, status = status.as_str(), "transitioned broadcast");
        Ok(())
    }

    async fn stream_health(&self, stream_id: &str) -> Result<StreamHealth> {
        let url = format!("{}/liveStreams", self.api_base);
        let response = self
            .get_json(&url, &[("part", "status"), ("id", stream_id)])
            .await?;
        let status = response
            .pointer("/items/0/status")
            .ok_or_else(|| Error::not_found("stream", stream_id))?;

        let issues = status
            .pointer("/healthStatus/configurationIssues")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.pointer("/description").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .unwrap_or_default();

        Ok(StreamHealth {
            status: status
                .pointer("/streamStatus")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            health: status
                .pointer("/healthStatus/status")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            configuration_issues: issues,
        })
    }

    async fn broadcast_stats(&self, broadcast_id: &str) -> Result<BroadcastStats> {
        let url = format!("{}/liveBroadcasts", self.api_base);
        let response = self
            .get_json(
                &url,
                &[("part", "statistics,status,contentDetails"), ("id", broadcast_id)],
            )
            .await?;
        let item = response
            .pointer("/items/0")
            .ok_or_else(|| Error::not_found("broadcast", broadcast_id))?;

        Ok(BroadcastStats {
            concurrent_viewers: item
                .pointer("/statistics/concurrentViewers")
                .and_then(|v| {
                    v.as_u64()
                        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
                }),
            lifecycle_status: item
                .pointer("/status/lifeCycleStatus")
                .and_then(Value::as_str)
                .map(String::from),
        })
    }

    async fn live_chat_id(&self, broadcast_id: &str) -> Result<Option<String>> {
        let url = format!("{}/liveBroadcasts", self.api_base);
        let response = self
            .get_json(&url, &[("part", "snippet"), ("id", broadcast_id)])
            .await?;
        Ok(response
            .pointer("/items/0/snippet/liveChatId")
            .and_then(Value::as_str)
            .map(String::from))
    }

    async fn send_chat_message(&self, live_chat_id: &str, text: &str) -> Result<()> {
        let body = json!({
            "snippet": {
                "liveChatId": live_chat_id,
                "type": "textMessageEvent",
                "textMessageDetails": { "messageText": text },
            }
        });
        let url = format!("{}/liveChatMessages", self.api_base);
        self.post_json(&url, &[("part", "snippet")], body).await?;
        Ok(())
    }

    async fn disable_chat(&self, broadcast_id: &str) -> Result<()> {
        let token = self.access_token().await?;
        let body = json!({
            "id": broadcast_id,
            "snippet": { "liveChatId": Value::Null },
            "contentDetails": { "monitorStream": { "enableMonitorStream": false } },
        });
        let url = format!("{}/liveBroadcasts", self.api_base);
        let response = self
            .http
            .put(&url)
            .bearer_auth(token)
            .query(&[("part", "snippet,contentDetails")])
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::remote_transient(e.to_string()))?;
        Self::check_status(response).await?;
        info!(broadcast_id, "disabled live chat");
        Ok(())
    }
}
