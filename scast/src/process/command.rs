//! Push command construction.

use crate::domain::{ContentSource, SessionConfig};

/// Audio bitrate used for all pushes.
const AUDIO_BITRATE: &str = "160k";

/// A fully-resolved external command ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl PushCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl std::fmt::Display for PushCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.program, self.args.join(" "))
    }
}

/// Build the ffmpeg argument list for pushing `content` to a single
/// ingestion target.
///
/// Each target gets its own process; a session with extra destinations
/// launches this once per URL rather than multiplexing through one encoder.
pub fn build_push_args(
    config: &SessionConfig,
    content: &ContentSource,
    target_url: &str,
) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();

    args.extend(["-hide_banner".into(), "-loglevel".into(), "info".into()]);

    if content.is_loop {
        args.extend(["-stream_loop".into(), "-1".into()]);
    }
    // Read input at native frame rate; mandatory for live pushes
    args.extend(["-re".into(), "-i".into(), content.source.clone()]);

    let video_bitrate = config.bitrate.clone();
    let bufsize = format!("{}k", config.bitrate_kbps() * 2);
    args.extend([
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "veryfast".into(),
        "-b:v".into(),
        video_bitrate.clone(),
        "-maxrate".into(),
        video_bitrate,
        "-bufsize".into(),
        bufsize,
        "-pix_fmt".into(),
        "yuv420p".into(),
    ]);

    args.extend([
        "-c:a".into(),
        "aac".into(),
        "-ar".into(),
        "44100".into(),
        "-b:a".into(),
        AUDIO_BITRATE.into(),
    ]);

    if let Some(height) = config.resolution_height() {
        args.extend(["-vf".into(), format!("scale=-2:{height}")]);
    }

    args.extend(["-f".into(), "flv".into(), target_url.to_string()]);

    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Privacy;

    fn test_config() -> SessionConfig {
        SessionConfig {
            name: "demo".into(),
            title: "Demo".into(),
            description: String::new(),
            privacy: Privacy::Unlisted,
            resolution: "720p".into(),
            bitrate: "3000k".into(),
            content: ContentSource::new("/media/loop.mp4"),
            extra_ingestion_urls: Vec::new(),
            scheduled_start: None,
        }
    }

    #[test]
    fn test_loop_flag_present_when_looping() {
        let config = test_config();
        let args = build_push_args(&config, &config.content, "rtmp://ingest/live/key");
        let joined = args.join(" ");
        assert!(joined.contains("-stream_loop -1"));
        assert!(joined.contains("-re -i /media/loop.mp4"));
    }

    #[test]
    fn test_loop_flag_absent_when_not_looping() {
        let config = test_config();
        let mut content = config.content.clone();
        content.is_loop = false;
        let args = build_push_args(&config, &content, "rtmp://ingest/live/key");
        assert!(!args.join(" ").contains("-stream_loop"));
    }

    #[test]
    fn test_encoder_settings() {
        let config = test_config();
        let args = build_push_args(&config, &config.content, "rtmp://ingest/live/key");
        let joined = args.join(" ");
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-b:v 3000k"));
        assert!(joined.contains("-maxrate 3000k"));
        assert!(joined.contains("-bufsize 6000k"));
        assert!(joined.contains("-vf scale=-2:720"));
        assert!(joined.contains("-c:a aac"));
    }

    #[test]
    fn test_single_flv_output_target() {
        let config = test_config();
        let args = build_push_args(&config, &config.content, "rtmp://ingest/live/key");
        assert_eq!(args.last().unwrap(), "rtmp://ingest/live/key");
        let flv_pos = args.iter().position(|a| a == "flv").unwrap();
        assert_eq!(args[flv_pos - 1], "-f");
    }
}
