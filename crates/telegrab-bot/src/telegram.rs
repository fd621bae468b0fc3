//! Telegram Bot API transport.
//!
//! The rest of the bot only consumes the [`Frontend`] trait; this module
//! also provides the production implementation, a thin reqwest client for
//! the Bot API (long-polling updates, message editing, multipart uploads).

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::job::MediaMetadata;

pub type ChatId = i64;

/// Identifies a sent message so it can later be edited or deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHandle {
    pub chat_id: ChatId,
    pub message_id: i64,
}

/// One row-major inline keyboard.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct Keyboard {
    pub inline_keyboard: Vec<Vec<Button>>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Button {
    pub text: String,
    pub callback_data: String,
}

impl Keyboard {
    pub fn row(mut self, text: &str, data: &str) -> Self {
        self.inline_keyboard.push(vec![Button {
            text: text.to_string(),
            callback_data: data.to_string(),
        }]);
        self
    }
}

/// Messaging capability consumed by the selection flow and the supervisor.
/// Implemented by [`TelegramClient`] in production and by recording fakes
/// in tests.
#[async_trait]
pub trait Frontend: Send + Sync {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<MessageHandle>;

    /// Fails if the message was deleted in the meantime; callers on the
    /// rendering path must swallow that failure.
    async fn edit_text(
        &self,
        handle: MessageHandle,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<()>;

    async fn delete_message(&self, handle: MessageHandle) -> Result<()>;

    async fn send_document(&self, chat_id: ChatId, path: &Path, filename: &str) -> Result<()>;

    async fn send_audio(
        &self,
        chat_id: ChatId,
        path: &Path,
        title: &str,
        meta: &MediaMetadata,
    ) -> Result<()>;

    async fn send_video(
        &self,
        chat_id: ChatId,
        path: &Path,
        caption: &str,
        meta: &MediaMetadata,
    ) -> Result<()>;

    /// Acknowledge a button press, optionally with an alert popup.
    async fn answer_callback(&self, callback_id: &str, text: Option<&str>, alert: bool)
        -> Result<()>;
}

// ── Inbound update types (getUpdates) ───────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: ChatId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    // No `serde(default)` here: it would bound `T: Default`, and a missing
    // `Option` field deserializes as `None` anyway.
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

// ── Production client ───────────────────────────────────────────────────────

/// Upload timeout for document/audio/video handoffs, seconds.
const UPLOAD_TIMEOUT_SECS: u64 = 120;

pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(api_url: &str, token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(90))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let response = self
            .http
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .with_context(|| format!("{} request failed", method))?;

        let api: ApiResponse<T> = response
            .json()
            .await
            .with_context(|| format!("{} returned malformed JSON", method))?;

        if !api.ok {
            bail!(
                "{} rejected: {}",
                method,
                api.description.unwrap_or_else(|| "unknown error".into())
            );
        }
        api.result
            .with_context(|| format!("{} returned no result", method))
    }

    async fn send_file(
        &self,
        method: &str,
        field: &str,
        chat_id: ChatId,
        path: &Path,
        filename: &str,
        extra: Vec<(&'static str, String)>,
    ) -> Result<()> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());

        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .part(field.to_string(), part);
        for (key, value) in extra {
            form = form.text(key, value);
        }

        debug!("uploading {} via {}", path.display(), method);

        let response = self
            .http
            .post(self.method_url(method))
            .multipart(form)
            .timeout(Duration::from_secs(UPLOAD_TIMEOUT_SECS))
            .send()
            .await
            .with_context(|| format!("{} upload failed", method))?;

        let api: ApiResponse<serde_json::Value> = response
            .json()
            .await
            .with_context(|| format!("{} returned malformed JSON", method))?;
        if !api.ok {
            bail!(
                "{} rejected: {}",
                method,
                api.description.unwrap_or_else(|| "unknown error".into())
            );
        }
        Ok(())
    }

    /// Long-poll for updates. `offset` is the next update_id to confirm.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        let response = self
            .http
            .post(self.method_url("getUpdates"))
            .json(&body)
            // Must outlive the server-side long-poll window.
            .timeout(Duration::from_secs(timeout_secs + 30))
            .send()
            .await
            .context("getUpdates request failed")?;

        let api: ApiResponse<Vec<Update>> =
            response.json().await.context("getUpdates returned malformed JSON")?;
        if !api.ok {
            bail!(
                "getUpdates rejected: {}",
                api.description.unwrap_or_else(|| "unknown error".into())
            );
        }
        Ok(api.result.unwrap_or_default())
    }
}

#[async_trait]
impl Frontend for TelegramClient {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<MessageHandle> {
        let mut body = serde_json::json!({ "chat_id": chat_id, "text": text });
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = serde_json::to_value(keyboard)?;
        }
        let sent: SentMessage = self.call("sendMessage", &body).await?;
        Ok(MessageHandle {
            chat_id,
            message_id: sent.message_id,
        })
    }

    async fn edit_text(
        &self,
        handle: MessageHandle,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<()> {
        let mut body = serde_json::json!({
            "chat_id": handle.chat_id,
            "message_id": handle.message_id,
            "text": text,
        });
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = serde_json::to_value(keyboard)?;
        }
        let _: serde_json::Value = self.call("editMessageText", &body).await?;
        Ok(())
    }

    async fn delete_message(&self, handle: MessageHandle) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": handle.chat_id,
            "message_id": handle.message_id,
        });
        let _: serde_json::Value = self.call("deleteMessage", &body).await?;
        Ok(())
    }

    async fn send_document(&self, chat_id: ChatId, path: &Path, filename: &str) -> Result<()> {
        self.send_file("sendDocument", "document", chat_id, path, filename, Vec::new())
            .await
    }

    async fn send_audio(
        &self,
        chat_id: ChatId,
        path: &Path,
        title: &str,
        meta: &MediaMetadata,
    ) -> Result<()> {
        let mut extra = vec![("title", title.to_string())];
        if let Some(uploader) = &meta.uploader {
            extra.push(("performer", uploader.clone()));
        }
        if let Some(duration) = meta.duration_secs {
            extra.push(("duration", duration.to_string()));
        }
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.mp3".to_string());
        self.send_file("sendAudio", "audio", chat_id, path, &filename, extra)
            .await
    }

    async fn send_video(
        &self,
        chat_id: ChatId,
        path: &Path,
        caption: &str,
        meta: &MediaMetadata,
    ) -> Result<()> {
        let mut extra = vec![
            ("caption", caption.to_string()),
            ("supports_streaming", "true".to_string()),
        ];
        if let Some(duration) = meta.duration_secs {
            extra.push(("duration", duration.to_string()));
        }
        if let Some(width) = meta.width {
            extra.push(("width", width.to_string()));
        }
        if let Some(height) = meta.height {
            extra.push(("height", height.to_string()));
        }
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video.mp4".to_string());
        self.send_file("sendVideo", "video", chat_id, path, &filename, extra)
            .await
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        alert: bool,
    ) -> Result<()> {
        let mut body = serde_json::json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            body["text"] = serde_json::Value::from(text);
            body["show_alert"] = serde_json::Value::from(alert);
        }
        let _: serde_json::Value = self.call("answerCallbackQuery", &body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyboard_builder_is_row_major() {
        let keyboard = Keyboard::default()
            .row("🎵 Audio", "format_audio")
            .row("🎬 Video", "format_video");
        assert_eq!(keyboard.inline_keyboard.len(), 2);
        assert_eq!(keyboard.inline_keyboard[0][0].callback_data, "format_audio");

        let json = serde_json::to_value(&keyboard).unwrap();
        assert_eq!(
            json["inline_keyboard"][1][0]["text"],
            serde_json::Value::from("🎬 Video")
        );
    }

    #[test]
    fn api_response_tolerates_missing_result() {
        // SentMessage has no Default impl; this also pins the envelope to
        // deserializing for arbitrary payload types.
        let raw = r#"{"ok":false,"description":"Bad Request: chat not found"}"#;
        let api: ApiResponse<SentMessage> = serde_json::from_str(raw).unwrap();
        assert!(!api.ok);
        assert!(api.result.is_none());
        assert_eq!(api.description.as_deref(), Some("Bad Request: chat not found"));
    }

    #[test]
    fn update_deserializes_message_and_callback() {
        let raw = r#"{
            "update_id": 7,
            "message": {
                "message_id": 1,
                "chat": { "id": -100 },
                "from": { "id": 42 },
                "text": "https://example.com/file.zip"
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        assert_eq!(update.update_id, 7);
        let message = update.message.unwrap();
        assert_eq!(message.chat.id, -100);
        assert_eq!(message.from.unwrap().id, 42);

        let raw = r#"{
            "update_id": 8,
            "callback_query": {
                "id": "cb1",
                "from": { "id": 42 },
                "data": "video_720",
                "message": { "message_id": 5, "chat": { "id": -100 } }
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        let query = update.callback_query.unwrap();
        assert_eq!(query.data.as_deref(), Some("video_720"));
        assert_eq!(query.message.unwrap().chat.id, -100);
    }
}
