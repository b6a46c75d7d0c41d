//! Notification dispatcher.
//!
//! [`decide`] is a pure function of a verdict and the notification policy.
//! Delivery is best-effort: the orchestrator logs failures and moves on.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{MessageFormat, PolicyConfig, TelegramConfig};
use crate::error::{Error, Result};
use crate::types::{Verdict, VerdictStatus};

/// Telegram rejects captions longer than this
const CAPTION_LIMIT: usize = 1024;

/// Why a verdict did not produce an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    Disabled,
    StatusNotNotified,
    BelowThreshold,
}

/// Outcome of the notification policy for one verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Send {
        attach_image: bool,
        attach_video: bool,
        silent: bool,
    },
    Suppress(SuppressReason),
}

/// Apply `policy` to `verdict`.
pub fn decide(verdict: &Verdict, policy: &PolicyConfig) -> Decision {
    if !policy.enabled {
        return Decision::Suppress(SuppressReason::Disabled);
    }
    if !policy.notify_statuses.contains(&verdict.status) {
        return Decision::Suppress(SuppressReason::StatusNotNotified);
    }
    if verdict.threat_level < policy.min_threat_level {
        return Decision::Suppress(SuppressReason::BelowThreshold);
    }

    Decision::Send {
        attach_image: policy.attach_image && verdict.image_path.is_some(),
        attach_video: policy.attach_video
            && verdict.threat_level >= policy.video_threat_threshold
            && verdict.video_path.is_some(),
        silent: policy.silent_statuses.contains(&verdict.status),
    }
}

/// A verdict ready for delivery. Never persisted.
#[derive(Debug, Clone)]
pub struct NotificationEnvelope {
    pub text: String,
    pub image: Option<PathBuf>,
    pub video: Option<PathBuf>,
    pub video_caption: String,
    pub silent: bool,
}

impl NotificationEnvelope {
    /// Build the envelope for `verdict`, or `None` when the policy suppresses it.
    pub fn for_verdict(verdict: &Verdict, policy: &PolicyConfig) -> Option<Self> {
        let Decision::Send {
            attach_image,
            attach_video,
            silent,
        } = decide(verdict, policy)
        else {
            return None;
        };

        Some(Self {
            text: format_message(verdict, policy.message_format),
            image: attach_image
                .then(|| verdict.image_path.as_deref().map(PathBuf::from))
                .flatten(),
            video: attach_video
                .then(|| verdict.video_path.as_deref().map(PathBuf::from))
                .flatten(),
            video_caption: format!(
                "🎥 <b>Incident video</b>\n📊 Threat level: {}/10\n🔗 Session: <code>{}</code>",
                verdict.threat_level,
                escape_html(&verdict.session_id)
            ),
            silent,
        })
    }
}

fn status_icon(status: VerdictStatus) -> &'static str {
    match status {
        VerdictStatus::Normal => "✅",
        VerdictStatus::Warning => "⚠️",
        VerdictStatus::Danger => "🚨",
        VerdictStatus::Unknown => "❓",
    }
}

/// Render `verdict` as Telegram HTML.
pub fn format_message(verdict: &Verdict, format: MessageFormat) -> String {
    let icon = status_icon(verdict.status);
    let time = verdict.timestamp.format("%Y-%m-%d %H:%M:%S UTC");
    let summary = escape_html(&verdict.summary);

    match format {
        MessageFormat::Simple => format!(
            "{icon} <b>Monitoring Alert</b>\n\n<b>Status:</b> {}\n<b>Confidence:</b> {:.1}%\n<b>Summary:</b> {summary}\n\n<i>Time:</i> {time}",
            verdict.status,
            verdict.confidence_percent(),
        ),
        MessageFormat::Detailed => {
            let threat_icon = match verdict.threat_level {
                8..=u8::MAX => "🚨🚨",
                5..=7 => "⚠️",
                _ => "✅",
            };
            let mut msg = format!(
                "🎥 <b>Vigil Monitoring</b>\n\n{icon} <b>Status:</b> {}\n📊 <b>Confidence:</b> {:.1}%\n{threat_icon} <b>Threat Level:</b> {}/10\n\n📋 <b>Type:</b> {}\n📄 <b>Summary:</b> {summary}\n",
                verdict.status,
                verdict.confidence_percent(),
                verdict.threat_level,
                verdict.monitoring_type,
            );
            if let Some(action) = &verdict.action {
                msg.push_str(&format!("🛠 <b>Action:</b> {}\n", escape_html(action)));
            }
            msg.push_str(&format!(
                "\n🔗 <b>Session:</b> <code>{}</code>\n🕒 <b>Time:</b> {time}",
                escape_html(&verdict.session_id)
            ));
            msg
        }
    }
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Alert channel
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send an envelope to the alert chat.
    async fn deliver(&self, envelope: &NotificationEnvelope) -> Result<()>;

    async fn send_text(&self, chat_id: &str, text: &str, silent: bool) -> Result<()>;

    async fn send_photo(&self, chat_id: &str, photo: Bytes, caption: &str) -> Result<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Telegram
// ─────────────────────────────────────────────────────────────────────────────

/// Telegram Bot API client
pub struct TelegramNotifier {
    api_base: String,
    token: String,
    chat_id: String,
    max_image_bytes: u64,
    max_video_bytes: u64,
    client: reqwest::Client,
}

/// Envelope returned by every Bot API method
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

/// Inbound update from `getUpdates`
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let token = config
            .bot_token
            .clone()
            .ok_or_else(|| Error::InvalidConfig("telegram.bot_token is not set".into()))?;
        let chat_id = config
            .chat_id
            .clone()
            .ok_or_else(|| Error::InvalidConfig("telegram.chat_id is not set".into()))?;

        // getUpdates long-polls, so the request timeout must outlast it.
        let timeout = config.timeout_secs.max(config.poll_timeout_secs + 10);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token,
            chat_id,
            max_image_bytes: config.max_image_bytes,
            max_video_bytes: config.max_video_bytes,
            client,
        })
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    fn url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn check<T: serde::de::DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> Result<Option<T>> {
        let status = response.status();
        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| Error::Delivery(format!("{method}: unreadable response ({status}): {e}")))?;
        if !status.is_success() || !body.ok {
            return Err(Error::Delivery(format!(
                "{method} failed ({status}): {}",
                body.description.unwrap_or_default()
            )));
        }
        Ok(body.result)
    }

    #[allow(clippy::too_many_arguments)]
    async fn send_media(
        &self,
        method: &str,
        field: &'static str,
        chat_id: &str,
        data: Vec<u8>,
        file_name: String,
        mime: &str,
        caption: &str,
        silent: bool,
    ) -> Result<()> {
        let part = reqwest::multipart::Part::bytes(data)
            .file_name(file_name)
            .mime_str(mime)?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", truncate_caption(caption))
            .text("parse_mode", "HTML")
            .text("disable_notification", silent.to_string())
            .part(field, part);

        let response = self
            .client
            .post(self.url(method))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Delivery(e.to_string()))?;
        Self::check::<serde_json::Value>(method, response).await?;
        debug!(method, "Telegram media sent");
        Ok(())
    }

    pub async fn send_video(&self, chat_id: &str, path: &Path, caption: &str) -> Result<()> {
        let data = tokio::fs::read(path).await?;
        let name = file_name(path, "video.mp4");
        let mime = if name.ends_with(".mp4") { "video/mp4" } else { "video/x-motion-jpeg" };
        self.send_media("sendVideo", "video", chat_id, data, name, mime, caption, false)
            .await
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let response = self
            .client
            .get(self.url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", timeout_secs.to_string()),
                ("allowed_updates", "[\"message\"]".to_string()),
            ])
            .send()
            .await
            .map_err(|e| Error::Delivery(e.to_string()))?;
        Ok(Self::check::<Vec<Update>>("getUpdates", response)
            .await?
            .unwrap_or_default())
    }
}

/// Size of `path` if it exists and fits under `limit`.
async fn sendable(path: &Path, limit: u64) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() <= limit => Some(meta.len()),
        Ok(meta) => {
            warn!(path = %path.display(), bytes = meta.len(), limit, "Attachment too large, skipping");
            None
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Attachment missing, skipping");
            None
        }
    }
}

fn file_name(path: &Path, fallback: &str) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}

fn truncate_caption(caption: &str) -> String {
    if caption.chars().count() <= CAPTION_LIMIT {
        caption.to_string()
    } else {
        caption.chars().take(CAPTION_LIMIT).collect()
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn deliver(&self, envelope: &NotificationEnvelope) -> Result<()> {
        let photo = match &envelope.image {
            Some(path) if sendable(path, self.max_image_bytes).await.is_some() => Some(path),
            _ => None,
        };

        match photo {
            Some(path) => {
                let data = tokio::fs::read(path).await?;
                let name = file_name(path, "frame.jpg");
                self.send_media(
                    "sendPhoto",
                    "photo",
                    &self.chat_id,
                    data,
                    name,
                    "image/jpeg",
                    &envelope.text,
                    envelope.silent,
                )
                .await?;
            }
            None => self.send_text(&self.chat_id, &envelope.text, envelope.silent).await?,
        }

        if let Some(video) = &envelope.video {
            if sendable(video, self.max_video_bytes).await.is_some() {
                self.send_video(&self.chat_id, video, &envelope.video_caption)
                    .await?;
            }
        }
        Ok(())
    }

    async fn send_text(&self, chat_id: &str, text: &str, silent: bool) -> Result<()> {
        let response = self
            .client
            .post(self.url("sendMessage"))
            .json(&serde_json::json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
                "disable_notification": silent,
            }))
            .send()
            .await
            .map_err(|e| Error::Delivery(e.to_string()))?;
        Self::check::<serde_json::Value>("sendMessage", response).await?;
        Ok(())
    }

    async fn send_photo(&self, chat_id: &str, photo: Bytes, caption: &str) -> Result<()> {
        if photo.len() as u64 > self.max_image_bytes {
            return Err(Error::Delivery(format!("photo too large: {} bytes", photo.len())));
        }
        self.send_media(
            "sendPhoto",
            "photo",
            chat_id,
            photo.to_vec(),
            "capture.jpg".to_string(),
            "image/jpeg",
            caption,
            false,
        )
        .await
    }
}
