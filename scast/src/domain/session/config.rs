//! Session configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Broadcast privacy levels supported by the remote platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    Public,
    #[default]
    Unlisted,
    Private,
}

impl Privacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Unlisted => "unlisted",
            Self::Private => "private",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Self::Public),
            "unlisted" => Some(Self::Unlisted),
            "private" => Some(Self::Private),
            _ => None,
        }
    }
}

impl std::fmt::Display for Privacy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The media source a session pushes to its ingestion targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSource {
    /// Local file path, remote URL, or playlist reference.
    pub source: String,
    /// Whether the source should loop indefinitely.
    #[serde(default = "default_true")]
    pub is_loop: bool,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Optional content category.
    #[serde(default)]
    pub category: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ContentSource {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            is_loop: true,
            tags: Vec::new(),
            category: None,
        }
    }
}

/// Resolutions accepted by the remote platform's CDN settings.
const SUPPORTED_RESOLUTIONS: &[&str] = &["2160p", "1440p", "1080p", "720p", "480p", "360p"];

/// Immutable configuration of a streaming session.
///
/// Validated once when the session is created; never mutated afterwards
/// (content swaps via `update_content` replace the source for the *next*
/// restart but leave the original request intact).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique user-supplied session name.
    pub name: String,
    /// Broadcast title.
    pub title: String,
    /// Broadcast description.
    #[serde(default)]
    pub description: String,
    /// Broadcast privacy level.
    #[serde(default)]
    pub privacy: Privacy,
    /// Target resolution, e.g. "1080p".
    pub resolution: String,
    /// Target video bitrate, e.g. "4500k".
    pub bitrate: String,
    /// Content to push.
    pub content: ContentSource,
    /// Additional ingestion URLs for multi-destination fan-out (ordered).
    #[serde(default)]
    pub extra_ingestion_urls: Vec<String>,
    /// Optional future activation time.
    #[serde(default)]
    pub scheduled_start: Option<DateTime<Utc>>,
}

impl SessionConfig {
    /// Validate the configuration. Rejected configs never produce a session.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("session name must not be empty"));
        }
        if self.title.trim().is_empty() {
            return Err(Error::validation("broadcast title must not be empty"));
        }
        if self.content.source.trim().is_empty() {
            return Err(Error::validation("content source must not be empty"));
        }
        if !SUPPORTED_RESOLUTIONS.contains(&self.resolution.as_str()) {
            return Err(Error::validation(format!(
                "unsupported resolution '{}' (expected one of {})",
                self.resolution,
                SUPPORTED_RESOLUTIONS.join(", ")
            )));
        }
        Self::validate_bitrate(&self.bitrate)?;

        let mut seen = std::collections::HashSet::new();
        for url in &self.extra_ingestion_urls {
            let parsed = url::Url::parse(url)
                .map_err(|e| Error::validation(format!("invalid ingestion URL '{url}': {e}")))?;
            if !matches!(parsed.scheme(), "rtmp" | "rtmps") {
                return Err(Error::validation(format!(
                    "ingestion URL '{url}' must use rtmp or rtmps"
                )));
            }
            if !seen.insert(url.as_str()) {
                return Err(Error::validation(format!(
                    "duplicate ingestion URL '{url}'"
                )));
            }
        }
        Ok(())
    }

    /// Bitrate strings follow the ffmpeg shorthand, e.g. "4500k".
    fn validate_bitrate(bitrate: &str) -> Result<()> {
        let digits = bitrate.strip_suffix('k').unwrap_or("");
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::validation(format!(
                "bitrate '{bitrate}' must be of the form '<digits>k'"
            )));
        }
        Ok(())
    }

    /// Numeric bitrate in kbit/s. Only valid after `validate()`.
    pub fn bitrate_kbps(&self) -> u64 {
        self.bitrate
            .strip_suffix('k')
            .and_then(|d| d.parse().ok())
            .unwrap_or(0)
    }

    /// Vertical resolution in pixels, e.g. 1080 for "1080p".
    pub fn resolution_height(&self) -> Option<u32> {
        self.resolution.strip_suffix('p').and_then(|d| d.parse().ok())
    }

    /// Total number of ingestion targets (primary + extras).
    pub fn target_count(&self) -> usize {
        1 + self.extra_ingestion_urls.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn valid_config() -> SessionConfig {
        SessionConfig {
            name: "demo".into(),
            title: "Demo stream".into(),
            description: String::new(),
            privacy: Privacy::Unlisted,
            resolution: "1080p".into(),
            bitrate: "4500k".into(),
            content: ContentSource::new("/media/loop.mp4"),
            extra_ingestion_urls: Vec::new(),
            scheduled_start: None,
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut config = valid_config();
        config.name = "  ".into();
        assert!(matches!(config.validate(), Err(Error::Validation(_))));
    }

    #[rstest]
    #[case("4500")]
    #[case("4500kbps")]
    #[case("k")]
    #[case("45.5k")]
    #[case("")]
    fn test_bad_bitrate_rejected(#[case] bitrate: &str) {
        let mut config = valid_config();
        config.bitrate = bitrate.into();
        assert!(
            matches!(config.validate(), Err(Error::Validation(_))),
            "bitrate '{bitrate}' should be rejected"
        );
    }

    #[test]
    fn test_unsupported_resolution_rejected() {
        let mut config = valid_config();
        config.resolution = "999p".into();
        assert!(matches!(config.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_extra_url_validation() {
        let mut config = valid_config();
        config.extra_ingestion_urls = vec!["rtmp://relay.example/live/key".into()];
        assert!(config.validate().is_ok());

        config.extra_ingestion_urls = vec!["https://relay.example/live".into()];
        assert!(config.validate().is_err());

        config.extra_ingestion_urls = vec![
            "rtmp://relay.example/live/key".into(),
            "rtmp://relay.example/live/key".into(),
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_values() {
        let config = valid_config();
        assert_eq!(config.bitrate_kbps(), 4500);
        assert_eq!(config.resolution_height(), Some(1080));
        assert_eq!(config.target_count(), 1);
    }

    #[test]
    fn test_privacy_parse() {
        assert_eq!(Privacy::parse("public"), Some(Privacy::Public));
        assert_eq!(Privacy::parse("bogus"), None);
        assert_eq!(Privacy::default(), Privacy::Unlisted);
    }
}
