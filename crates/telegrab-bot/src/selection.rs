//! Selection state machine for recognized platform links.
//!
//! AwaitingUrl → AwaitingFormat → AwaitingQuality → Resolved. Arbitrary
//! valid URLs bypass the whole flow and resolve directly as a generic file
//! job. High video qualities are gated behind the premium tier.

use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, warn};

use telegrab_core::error::JobError;

use crate::context::AppContext;
use crate::job::{JobKind, JobRequest};
use crate::progress::ProgressCell;
use crate::supervisor;
use crate::telegram::{CallbackQuery, ChatId, Keyboard};
use crate::ytdlp::{AUDIO_BITRATES, FREE_MAX_HEIGHT, VIDEO_HEIGHTS};

pub const WELCOME_TEXT: &str = "👋 Welcome to File Downloader Bot!\n\n\
    📎 Send me any link and I'll download it for you.\n\
    🎥 For YouTube links, I'll give you format options.\n\n\
    💎 Premium features (1080p+) available!\n\
    Use /premium to learn more.";

pub const PREMIUM_INFO_TEXT: &str = "💎 Premium Features:\n\n\
    • Download videos in 1080p and 1440p\n\
    • Faster download speeds\n\n\
    Ask the bot operator to add you to the premium list.";

const UPSELL_TEXT: &str = "💎 Premium Required!\n\n\
    Subscribe to access 1080p and 1440p downloads.\n\
    Use /premium for more information.";

const FORMAT_PROMPT: &str = "🎥 YouTube link detected!\n\nPlease choose format:";

fn platform_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(https?://)?(www\.)?(youtube|youtu|youtube-nocookie)\.(com|be)/").unwrap()
    })
}

/// Recognized video platform URL?
pub fn is_platform_url(url: &str) -> bool {
    platform_url_re().is_match(url)
}

/// Syntactic URL validation: absolute http(s) URL with a host.
pub fn validate_url(text: &str) -> Option<&str> {
    let text = text.trim();
    let parsed = url::Url::parse(text).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return None;
    }
    Some(text)
}

fn format_keyboard() -> Keyboard {
    Keyboard::default()
        .row("🎵 Audio", "format_audio")
        .row("🎬 Video", "format_video")
}

fn audio_quality_keyboard() -> Keyboard {
    let mut keyboard = Keyboard::default();
    for bitrate in AUDIO_BITRATES {
        keyboard = keyboard.row(&format!("🎵 {} kbps", bitrate), &format!("audio_{}", bitrate));
    }
    keyboard.row("◀️ Back", "back_to_format")
}

fn video_quality_keyboard(is_premium: bool) -> Keyboard {
    let mut keyboard = Keyboard::default()
        .row("📱 360p", "video_360")
        .row("📺 480p", "video_480")
        .row("🖥️ 720p", "video_720");
    if is_premium {
        keyboard = keyboard
            .row("💎 1080p (Premium)", "video_1080")
            .row("💎 1440p (Premium)", "video_1440");
    } else {
        // Gated options stay visible but locked.
        keyboard = keyboard.row("🔒 1080p+ (Premium Only)", "premium_required");
    }
    keyboard.row("◀️ Back", "back_to_format")
}

/// Handle a plain (non-command) text message.
pub async fn handle_text(ctx: &Arc<AppContext>, chat_id: ChatId, text: &str) {
    let url = match validate_url(text) {
        Some(url) => url.to_string(),
        None => {
            let _ = ctx
                .frontend
                .send_text(chat_id, "❌ Invalid URL. Please send a valid link.", None)
                .await;
            return;
        }
    };

    if is_platform_url(&url) {
        ctx.remember_url(chat_id, url).await;
        let _ = ctx
            .frontend
            .send_text(chat_id, FORMAT_PROMPT, Some(format_keyboard()))
            .await;
    } else {
        // Non-platform links skip the menus entirely.
        info!("generic fetch: {}", url);
        start_job(
            ctx,
            chat_id,
            JobRequest {
                url,
                kind: JobKind::GenericFile,
            },
        );
    }
}

/// Handle a button press. The opaque callback tag encodes the step.
pub async fn handle_callback(ctx: &Arc<AppContext>, query: &CallbackQuery) {
    let Some(message) = &query.message else { return };
    let chat_id = message.chat.id;
    let handle = crate::telegram::MessageHandle {
        chat_id,
        message_id: message.message_id,
    };
    let data = query.data.as_deref().unwrap_or("");
    let user_id = query.from.id;

    match data {
        "format_audio" => {
            let _ = ctx.frontend.answer_callback(&query.id, None, false).await;
            let _ = ctx
                .frontend
                .edit_text(handle, "🎵 Select audio quality:", Some(audio_quality_keyboard()))
                .await;
        }
        "format_video" => {
            let _ = ctx.frontend.answer_callback(&query.id, None, false).await;
            let _ = ctx
                .frontend
                .edit_text(
                    handle,
                    "🎬 Select video quality:",
                    Some(video_quality_keyboard(ctx.is_premium(user_id))),
                )
                .await;
        }
        "back_to_format" => {
            let _ = ctx.frontend.answer_callback(&query.id, None, false).await;
            let _ = ctx
                .frontend
                .edit_text(handle, FORMAT_PROMPT, Some(format_keyboard()))
                .await;
        }
        "premium_required" => {
            let _ = ctx
                .frontend
                .answer_callback(&query.id, Some("💎 Premium subscription required for 1080p+"), true)
                .await;
            let _ = ctx.frontend.send_text(chat_id, UPSELL_TEXT, None).await;
        }
        _ => {
            if let Some(kind) = parse_quality_tag(data) {
                resolve_quality(ctx, query, handle, chat_id, user_id, kind).await;
            } else {
                warn!("unknown callback tag: {data}");
                let _ = ctx.frontend.answer_callback(&query.id, None, false).await;
            }
        }
    }
}

/// Decode `audio_<bitrate>` / `video_<height>` tags into a job kind.
/// Unknown values fall out as None and are ignored.
pub fn parse_quality_tag(data: &str) -> Option<JobKind> {
    if let Some(bitrate) = data.strip_prefix("audio_") {
        let bitrate: u32 = bitrate.parse().ok()?;
        AUDIO_BITRATES
            .contains(&bitrate)
            .then_some(JobKind::Audio { bitrate_kbps: bitrate })
    } else if let Some(height) = data.strip_prefix("video_") {
        let height: u32 = height.parse().ok()?;
        VIDEO_HEIGHTS
            .contains(&height)
            .then_some(JobKind::Video { max_height: height })
    } else {
        None
    }
}

/// Quality gate, checked before any job is created. Heights above the free
/// cap need the premium tier.
fn premium_gate(is_premium: bool, kind: JobKind) -> Result<(), JobError> {
    if let JobKind::Video { max_height } = kind {
        if max_height > FREE_MAX_HEIGHT && !is_premium {
            return Err(JobError::PremiumRequired);
        }
    }
    Ok(())
}

async fn resolve_quality(
    ctx: &Arc<AppContext>,
    query: &CallbackQuery,
    handle: crate::telegram::MessageHandle,
    chat_id: ChatId,
    user_id: u64,
    kind: JobKind,
) {
    // On rejection the session URL is left in place so the user can pick
    // an ungated option instead.
    if premium_gate(ctx.is_premium(user_id), kind).is_err() {
        let _ = ctx
            .frontend
            .answer_callback(&query.id, Some("💎 Premium subscription required!"), true)
            .await;
        let _ = ctx.frontend.send_text(chat_id, UPSELL_TEXT, None).await;
        return;
    }

    let _ = ctx.frontend.answer_callback(&query.id, None, false).await;

    let Some(url) = ctx.take_url(chat_id).await else {
        let _ = ctx
            .frontend
            .edit_text(handle, "❌ Error: URL not found. Please send the link again.", None)
            .await;
        return;
    };

    let label = kind.quality_label();
    let verb = match kind {
        JobKind::Audio { .. } => "audio",
        _ => "video",
    };
    let _ = ctx
        .frontend
        .edit_text(handle, &format!("⏬ Downloading {verb} ({label})..."), None)
        .await;

    start_job(ctx, chat_id, JobRequest { url, kind });
}

/// Submit the resolved request and supervise it on its own task, so the
/// update dispatch loop keeps serving other users.
pub fn start_job(ctx: &Arc<AppContext>, chat_id: ChatId, request: JobRequest) {
    let cell = ProgressCell::new();
    let job = ctx.runner.submit(request.clone(), cell.clone());
    let ctx = Arc::clone(ctx);
    tokio::spawn(async move {
        let outcome = supervisor::supervise(
            ctx.frontend.as_ref(),
            &ctx.config.limits,
            chat_id,
            &request,
            cell,
            job,
        )
        .await;
        info!("job finished: {:?} {}", outcome, request.url);
    });
}
