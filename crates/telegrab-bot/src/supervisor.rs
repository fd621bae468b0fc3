//! Job supervisor: drives one job end-to-end.
//!
//! Starting → Running (renderer loop racing the worker and the deadline)
//! → Validating (size cap) → Uploading (cosmetic frames + handoff)
//! → Finalizing (cleanup, success summary, delayed status delete).
//! Whatever terminal state is reached, a produced artifact gets exactly one
//! deletion attempt before the supervisor returns.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::{debug, error, warn};

use telegrab_core::config::LimitsConfig;
use telegrab_core::error::{sanitize_error_text, JobError};

use crate::job::{JobKind, JobRequest, JobResult};
use crate::progress::{ProgressCell, Renderer, UPLOAD_FRAMES};
use crate::runner::RunningJob;
use crate::telegram::{ChatId, Frontend, MessageHandle};

const RENDER_INTERVAL: Duration = Duration::from_millis(1500);
const UPLOAD_FRAME_DELAY: Duration = Duration::from_millis(500);
const SUCCESS_LINGER: Duration = Duration::from_secs(3);

/// Terminal state of one supervised job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    /// Completed but rejected by post-completion policy (size cap).
    Rejected,
    /// Timed out or errored.
    Failed,
}

pub async fn supervise(
    frontend: &dyn Frontend,
    limits: &LimitsConfig,
    chat_id: ChatId,
    request: &JobRequest,
    cell: ProgressCell,
    job: RunningJob,
) -> Outcome {
    let status = match frontend.send_text(chat_id, "🔍 Analyzing link...", None).await {
        Ok(handle) => Some(handle),
        Err(e) => {
            // The job still runs to completion so its artifact gets cleaned.
            warn!("could not send status message: {e:#}");
            None
        }
    };

    let deadline_secs = if request.kind.is_media() {
        limits.media_timeout_secs
    } else {
        limits.generic_timeout_secs
    };

    // ── Running: renderer loop vs worker vs deadline ────────────────────
    let mut handle = job.handle;
    let mut renderer = Renderer::new(request.kind, cell);
    let mut interval = tokio::time::interval(RENDER_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let deadline = tokio::time::sleep(Duration::from_secs(deadline_secs));
    tokio::pin!(deadline);

    let joined = loop {
        tokio::select! {
            joined = &mut handle => break Some(joined),
            _ = &mut deadline => break None,
            _ = interval.tick() => {
                if let Some(handle) = status {
                    if let Some(text) = renderer.next_frame() {
                        // A rendering failure must never abort the job.
                        if let Err(e) = frontend.edit_text(handle, &text, None).await {
                            debug!("progress edit failed: {e:#}");
                        }
                    }
                }
            }
        }
    };

    let joined = match joined {
        Some(joined) => joined,
        None => {
            // Deadline elapsed: raise the stop flag so the worker kills its
            // subprocess and removes its own partial output.
            job.stop.store(true, Ordering::Relaxed);
            warn!("job timed out after {deadline_secs}s: {}", request.url);
            let text = format!(
                "⏱️ Timeout Error\n\n\
                 ❌ Download took too long (>{} min)\n\
                 💡 Try a shorter video or lower quality",
                deadline_secs / 60
            );
            report(frontend, chat_id, status, &text).await;
            return Outcome::Failed;
        }
    };

    let result = match joined {
        Ok(result) => result,
        Err(e) => {
            error!("job task failed to join: {e}");
            report(frontend, chat_id, status, "❌ Error\n\nInternal worker failure").await;
            return Outcome::Failed;
        }
    };

    let result = match result {
        Ok(result) => result,
        Err(e) => {
            report(frontend, chat_id, status, &error_text(&e, request.kind)).await;
            return Outcome::Failed;
        }
    };

    // ── Validating: size cap from the file actually on disk ─────────────
    let byte_size = match tokio::fs::metadata(&result.local_path).await {
        Ok(meta) => meta.len(),
        Err(e) => {
            error!("result file vanished: {e}");
            cleanup(&result.local_path).await;
            report(frontend, chat_id, status, "❌ Error\n\nDownloaded file disappeared").await;
            return Outcome::Failed;
        }
    };
    let size_mb = byte_size as f64 / (1024.0 * 1024.0);

    if byte_size > limits.max_file_bytes() {
        cleanup(&result.local_path).await;
        let err = JobError::TooLarge {
            size: byte_size,
            limit: limits.max_file_bytes(),
        };
        report(frontend, chat_id, status, &error_text(&err, request.kind)).await;
        return Outcome::Rejected;
    }

    // ── Uploading: cosmetic frames, then the actual handoff ─────────────
    if let Some(handle) = status {
        upload_animation(frontend, handle, request.kind, &result, size_mb).await;
    }

    if let Err(e) = hand_off(frontend, chat_id, request.kind, &result).await {
        error!("upload failed: {e:#}");
        cleanup(&result.local_path).await;
        let text = format!("❌ Error\n\n{}", sanitize_error_text(&format!("{e:#}")));
        report(frontend, chat_id, status, &text).await;
        return Outcome::Failed;
    }

    // ── Finalizing ──────────────────────────────────────────────────────
    cleanup(&result.local_path).await;

    if let Some(handle) = status {
        let summary = success_summary(request.kind, &result, size_mb);
        if frontend.edit_text(handle, &summary, None).await.is_ok() {
            tokio::time::sleep(SUCCESS_LINGER).await;
        }
        if let Err(e) = frontend.delete_message(handle).await {
            debug!("status delete failed: {e:#}");
        }
    }

    Outcome::Succeeded
}

/// One deletion attempt for the artifact, plus removal of the now-empty
/// per-job directory.
async fn cleanup(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("artifact cleanup failed for {}: {}", path.display(), e);
    }
    if let Some(dir) = path.parent() {
        let _ = tokio::fs::remove_dir(dir).await;
    }
}

/// Put the final status text where the user will see it: edit the status
/// message when there is one, otherwise send a fresh message.
async fn report(frontend: &dyn Frontend, chat_id: ChatId, status: Option<MessageHandle>, text: &str) {
    let delivered = match status {
        Some(handle) => frontend.edit_text(handle, text, None).await,
        None => frontend.send_text(chat_id, text, None).await.map(|_| ()),
    };
    if let Err(e) = delivered {
        warn!("could not deliver final status: {e:#}");
    }
}

fn error_text(error: &JobError, kind: JobKind) -> String {
    match error {
        JobError::TooLarge { size, limit } => format!(
            "❌ File Too Large\n\n\
             📦 Size: {:.1}MB\n\
             ⚠️ Limit: {}MB\n\n\
             {}",
            *size as f64 / (1024.0 * 1024.0),
            limit / (1024 * 1024),
            too_large_hint(kind)
        ),
        JobError::ToolMissing { tool } => format!(
            "❌ {tool} Not Found\n\n\
             Please install {tool}:\n\
             • Linux: apt install {tool}\n\
             • macOS: brew install {tool}\n\
             • Windows: choco install {tool}"
        ),
        other => format!("❌ Error\n\n{}", sanitize_error_text(&other.to_string())),
    }
}

fn too_large_hint(kind: JobKind) -> &'static str {
    match kind {
        JobKind::Audio { .. } => "💡 Try a shorter video",
        JobKind::Video { .. } => {
            "💡 Try lower quality:\n\
             • 360p for longer videos\n\
             • 480p for medium videos\n\
             • 720p for short clips"
        }
        JobKind::GenericFile => "💡 Telegram has a 50MB file size limit",
    }
}

/// Short fixed upload animation; not tied to actual transfer progress.
async fn upload_animation(
    frontend: &dyn Frontend,
    handle: MessageHandle,
    kind: JobKind,
    result: &JobResult,
    size_mb: f64,
) {
    let detail = match kind {
        JobKind::Audio { .. } => format!("🎵 Format: MP3 ({})", kind.quality_label()),
        JobKind::Video { .. } => format!("🎥 Format: MP4 ({})", kind.quality_label()),
        JobKind::GenericFile => {
            format!("📄 File: {}", truncate(&result.display_title, 30))
        }
    };
    for frame in 0..3 {
        let icon = UPLOAD_FRAMES[frame % UPLOAD_FRAMES.len()];
        let text = format!(
            "{icon} Uploading to Telegram\n\n\
             📦 Size: {size_mb:.1}MB\n\
             {detail}\n\
             ⏳ Please wait..."
        );
        if let Err(e) = frontend.edit_text(handle, &text, None).await {
            debug!("upload frame edit failed: {e:#}");
        }
        tokio::time::sleep(UPLOAD_FRAME_DELAY).await;
    }
}

async fn hand_off(
    frontend: &dyn Frontend,
    chat_id: ChatId,
    kind: JobKind,
    result: &JobResult,
) -> anyhow::Result<()> {
    let meta = result.media.clone().unwrap_or_default();
    match kind {
        JobKind::Audio { .. } => {
            frontend
                .send_audio(
                    chat_id,
                    &result.local_path,
                    &truncate(&result.display_title, 100),
                    &meta,
                )
                .await
        }
        JobKind::Video { .. } => {
            frontend
                .send_video(
                    chat_id,
                    &result.local_path,
                    &truncate(&result.display_title, 200),
                    &meta,
                )
                .await
        }
        JobKind::GenericFile => {
            let filename = result
                .local_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| result.display_title.clone());
            frontend.send_document(chat_id, &result.local_path, &filename).await
        }
    }
}

fn success_summary(kind: JobKind, result: &JobResult, size_mb: f64) -> String {
    let title = truncate(&result.display_title, 50);
    match kind {
        JobKind::Audio { .. } => format!(
            "✅ Download Complete!\n\n🎵 {title}\n📦 {size_mb:.1}MB • {}",
            kind.quality_label()
        ),
        JobKind::Video { .. } => format!(
            "✅ Download Complete!\n\n🎥 {title}\n📦 {size_mb:.1}MB • {}",
            kind.quality_label()
        ),
        JobKind::GenericFile => {
            format!("✅ Download Complete!\n\n📄 {title}\n📦 {size_mb:.1}MB")
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
