//! End-to-end supervisor tests against a recording fake frontend.
//!
//! Time is paused, so deadlines and animation delays elapse instantly.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use common::{Call, FakeFrontend};
use telegrab_bot::job::{JobKind, JobRequest, JobResult, MediaMetadata};
use telegrab_bot::progress::{Phase, ProgressCell, Snapshot};
use telegrab_bot::runner::RunningJob;
use telegrab_bot::supervisor::{supervise, Outcome};
use telegrab_core::config::LimitsConfig;
use telegrab_core::error::JobError;

const CHAT: i64 = 1001;

fn audio_request() -> JobRequest {
    JobRequest {
        url: "https://youtube.com/watch?v=abc".to_string(),
        kind: JobKind::Audio { bitrate_kbps: 320 },
    }
}

fn completed_job(result: JobResult) -> RunningJob {
    RunningJob {
        handle: tokio::spawn(async move { Ok(result) }),
        stop: Arc::new(AtomicBool::new(false)),
    }
}

fn failed_job(error: JobError) -> RunningJob {
    RunningJob {
        handle: tokio::spawn(async move { Err(error) }),
        stop: Arc::new(AtomicBool::new(false)),
    }
}

fn write_artifact(dir: &TempDir, name: &str, len: u64) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let file = std::fs::File::create(&path).unwrap();
    file.set_len(len).unwrap();
    path
}

#[tokio::test(start_paused = true)]
async fn success_delivers_audio_and_cleans_up() {
    let dir = TempDir::new().unwrap();
    let path = write_artifact(&dir, "song.mp3", 4096);
    let result = JobResult {
        local_path: path.clone(),
        display_title: "Test Song".to_string(),
        byte_size: 4096,
        media: Some(MediaMetadata {
            uploader: Some("Tester".to_string()),
            duration_secs: Some(180),
            ..Default::default()
        }),
    };

    let frontend = FakeFrontend::new();
    let outcome = supervise(
        &frontend,
        &LimitsConfig::default(),
        CHAT,
        &audio_request(),
        ProgressCell::new(),
        completed_job(result),
    )
    .await;

    assert_eq!(outcome, Outcome::Succeeded);
    assert!(!path.exists(), "artifact must be deleted after delivery");

    let uploads = frontend.uploads();
    assert_eq!(uploads.len(), 1);
    assert!(matches!(&uploads[0], Call::SendAudio { title, .. } if title == "Test Song"));

    // Status message edited to a success summary, then deleted.
    let edits = frontend.edits();
    assert!(edits.last().unwrap().contains("✅ Download Complete!"));
    assert!(frontend
        .calls()
        .iter()
        .any(|c| matches!(c, Call::DeleteMessage { .. })));
}

#[tokio::test(start_paused = true)]
async fn oversized_file_is_rejected_and_never_uploaded() {
    let dir = TempDir::new().unwrap();
    let path = write_artifact(&dir, "movie.mp4", 51 * 1024 * 1024);
    let result = JobResult {
        local_path: path.clone(),
        display_title: "Big Movie".to_string(),
        byte_size: 51 * 1024 * 1024,
        media: Some(MediaMetadata::default()),
    };

    let frontend = FakeFrontend::new();
    let request = JobRequest {
        url: "https://youtube.com/watch?v=abc".to_string(),
        kind: JobKind::Video { max_height: 720 },
    };
    let outcome = supervise(
        &frontend,
        &LimitsConfig::default(),
        CHAT,
        &request,
        ProgressCell::new(),
        completed_job(result),
    )
    .await;

    assert_eq!(outcome, Outcome::Rejected);
    assert!(!path.exists(), "oversized artifact must be deleted");
    assert!(frontend.uploads().is_empty(), "rejected job must not upload");

    let edits = frontend.edits();
    let rejection = edits.last().unwrap();
    assert!(rejection.contains("File Too Large"));
    assert!(rejection.contains("51.0MB"));
    assert!(rejection.contains("Limit: 50MB"));
}

#[tokio::test(start_paused = true)]
async fn deadline_reports_timeout_and_raises_stop_flag() {
    let job = RunningJob {
        handle: tokio::spawn(std::future::pending()),
        stop: Arc::new(AtomicBool::new(false)),
    };
    let stop = Arc::clone(&job.stop);

    let frontend = FakeFrontend::new();
    let outcome = supervise(
        &frontend,
        &LimitsConfig::default(),
        CHAT,
        &audio_request(),
        ProgressCell::new(),
        job,
    )
    .await;

    assert_eq!(outcome, Outcome::Failed);
    assert!(stop.load(Ordering::Relaxed), "stop flag must be raised");
    assert!(frontend.uploads().is_empty(), "timed-out job must not upload");

    let edits = frontend.edits();
    let last = edits.last().unwrap();
    assert!(last.contains("Timeout"));
    assert!(last.contains("15 min"));
}

#[tokio::test(start_paused = true)]
async fn generic_jobs_use_the_short_deadline() {
    let job = RunningJob {
        handle: tokio::spawn(std::future::pending()),
        stop: Arc::new(AtomicBool::new(false)),
    };

    let frontend = FakeFrontend::new();
    let request = JobRequest {
        url: "https://example.com/big.iso".to_string(),
        kind: JobKind::GenericFile,
    };
    let started = tokio::time::Instant::now();
    let outcome = supervise(
        &frontend,
        &LimitsConfig::default(),
        CHAT,
        &request,
        ProgressCell::new(),
        job,
    )
    .await;

    assert_eq!(outcome, Outcome::Failed);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(300));
    assert!(elapsed < Duration::from_secs(310));
}

#[tokio::test(start_paused = true)]
async fn upstream_error_is_sanitized_for_the_user() {
    let frontend = FakeFrontend::new();
    let outcome = supervise(
        &frontend,
        &LimitsConfig::default(),
        CHAT,
        &audio_request(),
        ProgressCell::new(),
        failed_job(JobError::Upstream(
            "\x1b[0;31mERROR:\x1b[0m unable to extract video data".to_string(),
        )),
    )
    .await;

    assert_eq!(outcome, Outcome::Failed);
    let edits = frontend.edits();
    let last = edits.last().unwrap();
    assert!(last.contains("unable to extract video data"));
    assert!(!last.contains('\x1b'), "ANSI escapes must be stripped");
}

#[tokio::test(start_paused = true)]
async fn missing_tool_gets_install_instructions() {
    let frontend = FakeFrontend::new();
    let outcome = supervise(
        &frontend,
        &LimitsConfig::default(),
        CHAT,
        &audio_request(),
        ProgressCell::new(),
        failed_job(JobError::ToolMissing { tool: "ffmpeg" }),
    )
    .await;

    assert_eq!(outcome, Outcome::Failed);
    let edits = frontend.edits();
    let last = edits.last().unwrap();
    assert!(last.contains("ffmpeg Not Found"));
    assert!(last.contains("install"));
}

#[tokio::test(start_paused = true)]
async fn edit_failures_never_abort_the_job() {
    let dir = TempDir::new().unwrap();
    let path = write_artifact(&dir, "file.bin", 1024);
    let result = JobResult {
        local_path: path.clone(),
        display_title: "file.bin".to_string(),
        byte_size: 1024,
        media: None,
    };

    let frontend = FakeFrontend::failing_edits();
    let request = JobRequest {
        url: "https://example.com/file.bin".to_string(),
        kind: JobKind::GenericFile,
    };
    let outcome = supervise(
        &frontend,
        &LimitsConfig::default(),
        CHAT,
        &request,
        ProgressCell::new(),
        completed_job(result),
    )
    .await;

    assert_eq!(outcome, Outcome::Succeeded);
    assert!(!path.exists());
    assert_eq!(frontend.uploads().len(), 1);
}

/// Percent sequence 0, 25, 50, 100 then completion. Each emitted status
/// is distinct from its predecessor and carries the discretized bar for
/// the latest observed percent.
#[tokio::test(start_paused = true)]
async fn renderer_emits_distinct_statuses_for_progress_sequence() {
    let dir = TempDir::new().unwrap();
    let path = write_artifact(&dir, "clip.mp4", 2048);
    let cell = ProgressCell::new();

    let worker_cell = cell.clone();
    let result = JobResult {
        local_path: path.clone(),
        display_title: "Clip".to_string(),
        byte_size: 2048,
        media: Some(MediaMetadata::default()),
    };
    let job = RunningJob {
        handle: tokio::spawn(async move {
            for percent in [0.0_f32, 25.0, 50.0, 100.0] {
                worker_cell.publish(Snapshot {
                    phase: Phase::Downloading,
                    percent: Some(percent),
                    speed: Some("2.56MiB/s".to_string()),
                    eta: Some("00:12".to_string()),
                });
                tokio::time::sleep(Duration::from_secs(3)).await;
            }
            worker_cell.set_phase(Phase::Done);
            Ok(result)
        }),
        stop: Arc::new(AtomicBool::new(false)),
    };

    let frontend = FakeFrontend::new();
    let request = JobRequest {
        url: "https://youtube.com/watch?v=abc".to_string(),
        kind: JobKind::Video { max_height: 360 },
    };
    let outcome = supervise(
        &frontend,
        &LimitsConfig::default(),
        CHAT,
        &request,
        cell,
        job,
    )
    .await;

    assert_eq!(outcome, Outcome::Succeeded);

    let edits = frontend.edits();
    // Never two identical consecutive statuses.
    for pair in edits.windows(2) {
        assert_ne!(pair[0], pair[1]);
    }
    // The 50% snapshot renders the half-full bar.
    assert!(edits.iter().any(|e| e.contains("▰▰▰▰▰▱▱▱▱▱")));
    assert!(edits.iter().any(|e| e.contains("100.0%")));
}
