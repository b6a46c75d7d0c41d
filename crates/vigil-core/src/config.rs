//! Component configuration
//!
//! Typed configuration for every collaborator the engine composes. Each
//! struct deserializes with per-field defaults so a partial TOML table is
//! enough to override a single value.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::retry::RetryPolicy;
use crate::types::{RetentionPolicy, VerdictStatus};

/// Camera HTTP endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Base URL of the camera (default: http://192.168.1.100)
    pub base_url: String,

    /// Per-request timeout in seconds (default: 10)
    pub timeout_secs: u64,

    /// Smallest payload accepted as a real frame (default: 1000 bytes)
    pub min_frame_bytes: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            base_url: "http://192.168.1.100".to_string(),
            timeout_secs: 10,
            min_frame_bytes: 1000,
        }
    }
}

/// Which analyzer implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Real reasoning service over HTTP
    Live,
    /// Canned responses, no network
    Simulated,
}

/// How simulated responses are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulatedPattern {
    Fixed,
    Sequential,
    Random,
}

/// Reasoning service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Analyzer implementation (default: live)
    pub mode: AnalysisMode,

    /// Base URL of an OpenAI-compatible API (default: https://api.openai.com/v1)
    pub base_url: String,

    /// Bearer token for the API
    pub api_key: Option<String>,

    /// Vision-capable model name (default: gpt-4o)
    pub model: String,

    /// Maximum tokens per reply (default: 400)
    pub max_tokens: u32,

    /// Sampling temperature (default: 0.1)
    pub temperature: f32,

    /// Per-request timeout in seconds (default: 45)
    pub timeout_secs: u64,

    /// Selection pattern for simulated mode (default: sequential)
    pub simulated_pattern: SimulatedPattern,

    /// Response used by the fixed pattern (default: normal)
    pub simulated_response: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            mode: AnalysisMode::Live,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o".to_string(),
            max_tokens: 400,
            temperature: 0.1,
            timeout_secs: 45,
            simulated_pattern: SimulatedPattern::Sequential,
            simulated_response: "normal".to_string(),
        }
    }
}

/// Alert message layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageFormat {
    Simple,
    Detailed,
}

/// Notification policy: when a verdict turns into an alert
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Master switch (default: true)
    pub enabled: bool,

    /// Minimum threat level that triggers an alert (default: 3)
    pub min_threat_level: u8,

    /// Statuses that may trigger an alert (default: NORMAL, WARNING, DANGER)
    pub notify_statuses: Vec<VerdictStatus>,

    /// Statuses delivered without a sound (default: NORMAL)
    pub silent_statuses: Vec<VerdictStatus>,

    /// Attach the analysed frame (default: true)
    pub attach_image: bool,

    /// Attach recorded video on escalations (default: true)
    pub attach_video: bool,

    /// Threat level from which video is attached (default: 5)
    pub video_threat_threshold: u8,

    /// Message layout (default: detailed)
    pub message_format: MessageFormat,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_threat_level: 3,
            notify_statuses: vec![
                VerdictStatus::Normal,
                VerdictStatus::Warning,
                VerdictStatus::Danger,
            ],
            silent_statuses: vec![VerdictStatus::Normal],
            attach_image: true,
            attach_video: true,
            video_threat_threshold: 5,
            message_format: MessageFormat::Detailed,
        }
    }
}

/// Telegram bot configuration (alert channel and command front end)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Enable the bot (default: false)
    pub enabled: bool,

    /// Bot token from @BotFather
    pub bot_token: Option<String>,

    /// Chat receiving alerts
    pub chat_id: Option<String>,

    /// Chats allowed to issue commands; the alert chat is always allowed
    pub authorized_chats: Vec<String>,

    /// Bot API base URL (default: https://api.telegram.org)
    pub api_base: String,

    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,

    /// Long-poll timeout for getUpdates in seconds (default: 25)
    pub poll_timeout_secs: u64,

    /// Largest photo sent (default: 5 MiB)
    pub max_image_bytes: u64,

    /// Largest video sent (default: 50 MiB)
    pub max_video_bytes: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: None,
            chat_id: None,
            authorized_chats: Vec::new(),
            api_base: "https://api.telegram.org".to_string(),
            timeout_secs: 30,
            poll_timeout_secs: 25,
            max_image_bytes: 5 * 1024 * 1024,
            max_video_bytes: 50 * 1024 * 1024,
        }
    }
}

impl TelegramConfig {
    /// Bot token and chat id are both set and well-formed.
    pub fn is_usable(&self) -> bool {
        let token_ok = self
            .bot_token
            .as_deref()
            .is_some_and(|t| t.contains(':') && !t.trim().is_empty());
        let chat_ok = self
            .chat_id
            .as_deref()
            .is_some_and(|c| !c.is_empty() && c.trim_start_matches('-').chars().all(|ch| ch.is_ascii_digit()));
        self.enabled && token_ok && chat_ok
    }

    pub fn is_authorized(&self, chat_id: &str) -> bool {
        self.chat_id.as_deref() == Some(chat_id) || self.authorized_chats.iter().any(|c| c == chat_id)
    }
}

/// Video recording configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Record video alongside cycles (default: true)
    pub enabled: bool,

    /// Directory for finished clips
    pub videos_dir: PathBuf,

    /// Upper bound on a single clip in seconds (default: 300)
    pub max_duration_secs: u64,

    /// How long close waits for a clip to be finalized, on top of any
    /// conversion time (default: 10)
    pub finalize_timeout_secs: u64,

    /// Upper bound on one ffmpeg conversion in seconds (default: 60)
    pub convert_timeout_secs: u64,

    /// Convert MJPEG clips to MP4 when ffmpeg is available (default: true)
    pub convert_to_mp4: bool,

    /// Explicit ffmpeg binary; looked up on PATH otherwise
    pub ffmpeg_path: Option<PathBuf>,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            videos_dir: PathBuf::from("media/videos"),
            max_duration_secs: 300,
            finalize_timeout_secs: 10,
            convert_timeout_secs: 60,
            convert_to_mp4: true,
            ffmpeg_path: None,
        }
    }
}

/// Storage and retention configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Directory for baseline and analysed frames
    pub images_dir: PathBuf,

    /// Retention rules applied by the cleanup task
    pub retention: RetentionPolicy,

    /// Hours between cleanup runs (default: 24, 0 disables)
    pub cleanup_interval_hours: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("vigil.db"),
            images_dir: PathBuf::from("media/images"),
            retention: RetentionPolicy::default(),
            cleanup_interval_hours: 24,
        }
    }
}

/// Engine-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Retry policy for frame capture
    pub capture_retry: RetryPolicy,

    /// Retry policy for analysis requests
    pub analysis_retry: RetryPolicy,

    /// Notification policy
    pub policy: PolicyConfig,

    /// Upper bound on one alert delivery in seconds (default: 60)
    pub notify_timeout_secs: u64,

    /// Smallest accepted session interval (default: 5)
    pub min_interval_secs: u64,

    /// Largest accepted session interval (default: 3600)
    pub max_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capture_retry: RetryPolicy::default(),
            analysis_retry: RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 5000,
                max_delay_ms: 30_000,
                attempt_timeout_secs: 60,
            },
            policy: PolicyConfig::default(),
            notify_timeout_secs: 60,
            min_interval_secs: 5,
            max_interval_secs: 3600,
        }
    }
}

impl EngineConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.min_interval_secs == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "engine.min_interval_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.min_interval_secs > self.max_interval_secs {
            return Err(ConfigValidationError::InvalidValue {
                field: "engine.max_interval_secs".into(),
                message: "must not be below min_interval_secs".into(),
            });
        }

        if self.policy.min_threat_level > 10 || self.policy.video_threat_threshold > 10 {
            return Err(ConfigValidationError::InvalidValue {
                field: "engine.policy".into(),
                message: "threat thresholds must be between 0 and 10".into(),
            });
        }

        for (field, retry) in [
            ("engine.capture_retry", &self.capture_retry),
            ("engine.analysis_retry", &self.analysis_retry),
        ] {
            if retry.max_attempts == 0 || retry.attempt_timeout_secs == 0 {
                return Err(ConfigValidationError::InvalidValue {
                    field: field.into(),
                    message: "max_attempts and attempt_timeout_secs must be greater than 0".into(),
                });
            }
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
