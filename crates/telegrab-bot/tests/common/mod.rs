//! Recording fake of the messaging frontend, shared by integration tests.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;

use telegrab_bot::job::MediaMetadata;
use telegrab_bot::telegram::{ChatId, Frontend, Keyboard, MessageHandle};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SendText {
        chat_id: ChatId,
        text: String,
        keyboard: Option<Keyboard>,
    },
    EditText {
        message_id: i64,
        text: String,
        keyboard: Option<Keyboard>,
    },
    DeleteMessage {
        message_id: i64,
    },
    SendDocument {
        filename: String,
        path: PathBuf,
    },
    SendAudio {
        title: String,
        path: PathBuf,
    },
    SendVideo {
        caption: String,
        path: PathBuf,
    },
    AnswerCallback {
        text: Option<String>,
        alert: bool,
    },
}

/// Fake frontend that records every call. Optionally fails all edits, to
/// exercise the renderer's swallow-and-continue contract.
#[derive(Default)]
pub struct FakeFrontend {
    pub calls: Mutex<Vec<Call>>,
    pub fail_edits: bool,
    next_message_id: Mutex<i64>,
}

impl FakeFrontend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_edits() -> Self {
        Self {
            fail_edits: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn edits(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::EditText { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn uploads(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| {
                matches!(
                    c,
                    Call::SendDocument { .. } | Call::SendAudio { .. } | Call::SendVideo { .. }
                )
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Frontend for FakeFrontend {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<MessageHandle> {
        self.record(Call::SendText {
            chat_id,
            text: text.to_string(),
            keyboard,
        });
        let mut next = self.next_message_id.lock().unwrap();
        *next += 1;
        Ok(MessageHandle {
            chat_id,
            message_id: *next,
        })
    }

    async fn edit_text(
        &self,
        handle: MessageHandle,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<()> {
        if self.fail_edits {
            bail!("message to edit not found");
        }
        self.record(Call::EditText {
            message_id: handle.message_id,
            text: text.to_string(),
            keyboard,
        });
        Ok(())
    }

    async fn delete_message(&self, handle: MessageHandle) -> Result<()> {
        self.record(Call::DeleteMessage {
            message_id: handle.message_id,
        });
        Ok(())
    }

    async fn send_document(&self, _chat_id: ChatId, path: &Path, filename: &str) -> Result<()> {
        self.record(Call::SendDocument {
            filename: filename.to_string(),
            path: path.to_path_buf(),
        });
        Ok(())
    }

    async fn send_audio(
        &self,
        _chat_id: ChatId,
        path: &Path,
        title: &str,
        _meta: &MediaMetadata,
    ) -> Result<()> {
        self.record(Call::SendAudio {
            title: title.to_string(),
            path: path.to_path_buf(),
        });
        Ok(())
    }

    async fn send_video(
        &self,
        _chat_id: ChatId,
        path: &Path,
        caption: &str,
        _meta: &MediaMetadata,
    ) -> Result<()> {
        self.record(Call::SendVideo {
            caption: caption.to_string(),
            path: path.to_path_buf(),
        });
        Ok(())
    }

    async fn answer_callback(
        &self,
        _callback_id: &str,
        text: Option<&str>,
        alert: bool,
    ) -> Result<()> {
        self.record(Call::AnswerCallback {
            text: text.map(|s| s.to_string()),
            alert,
        });
        Ok(())
    }
}
