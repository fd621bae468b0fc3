//! Job error taxonomy shared between the runner and the supervisor.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Maximum length of an error string shown to the user.
pub const MAX_USER_ERROR_LEN: usize = 300;

/// Everything that can go wrong with a single download job.
///
/// `InvalidInput` and `PremiumRequired` are rejected before a job is ever
/// submitted; the remaining kinds surface from inside the supervisor.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid URL")]
    InvalidInput,

    #[error("premium subscription required")]
    PremiumRequired,

    #[error("download took too long")]
    Timeout,

    #[error("file too large: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },

    #[error("{tool} not found")]
    ToolMissing { tool: &'static str },

    #[error("download failed: {0}")]
    Upstream(String),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

impl JobError {
    /// Classify raw upstream error text. Retrieval tools report a missing
    /// transcoder only as free text, so it is pattern-matched back into the
    /// typed `ToolMissing` variant here.
    pub fn from_upstream(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.to_lowercase().contains("ffmpeg") {
            JobError::ToolMissing { tool: "ffmpeg" }
        } else {
            JobError::Upstream(text)
        }
    }
}

fn ansi_escape_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]|\[[0-9;]+m").unwrap())
}

/// Strip ANSI escape sequences and truncate to a user-presentable length.
///
/// yt-dlp colours its error output; the colour codes must never reach the
/// chat message. Truncation is char-boundary safe.
pub fn sanitize_error_text(raw: &str) -> String {
    let stripped = ansi_escape_re().replace_all(raw, "");
    stripped.chars().take(MAX_USER_ERROR_LEN).collect()
}
