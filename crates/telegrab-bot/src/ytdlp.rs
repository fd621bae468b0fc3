//! yt-dlp wrapper: the media retrieval half of the blocking job runner.
//!
//! Runs yt-dlp as a subprocess with `--newline` progress output, feeds
//! parsed progress into the job's [`ProgressCell`], and reads the
//! `.info.json` sidecar for title/uploader/dimension metadata once the
//! download and transcode have finished.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use telegrab_core::error::JobError;

use crate::job::{JobKind, JobResult, MediaMetadata};
use crate::progress::{Phase, ProgressCell, Snapshot};

/// Bitrates offered by the audio quality menu, kbps.
pub const AUDIO_BITRATES: [u32; 3] = [128, 192, 320];
/// Heights offered by the video quality menu. The last two are gated
/// behind the premium tier.
pub const VIDEO_HEIGHTS: [u32; 5] = [360, 480, 720, 1080, 1440];
/// Heights above this require the premium tier.
pub const FREE_MAX_HEIGHT: u32 = 720;

/// Validated, fully-enumerated options for one retrieval run. Replaces the
/// loose option bag the retrieval tool would otherwise be driven with.
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    pub url: String,
    pub format: FormatSpec,
    /// Per-job working directory; the output template points inside it.
    pub work_dir: PathBuf,
    pub socket_timeout_secs: u64,
    pub retries: u32,
    pub ffmpeg_location: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatSpec {
    /// bestaudio, post-processed to mp3 at the given bitrate.
    Mp3 { bitrate_kbps: u32 },
    /// bestvideo+bestaudio capped at the given height, merged to mp4.
    Mp4 { max_height: u32 },
}

impl RetrievalOptions {
    /// Build options for a media job. Rejects qualities the selection menus
    /// never offer, so the subprocess only ever sees known-good selectors.
    pub fn new(
        url: &str,
        kind: JobKind,
        work_dir: PathBuf,
        ffmpeg_location: Option<PathBuf>,
    ) -> Result<Self, JobError> {
        let format = match kind {
            JobKind::Audio { bitrate_kbps } => {
                if !AUDIO_BITRATES.contains(&bitrate_kbps) {
                    return Err(JobError::InvalidInput);
                }
                FormatSpec::Mp3 { bitrate_kbps }
            }
            JobKind::Video { max_height } => {
                if !VIDEO_HEIGHTS.contains(&max_height) {
                    return Err(JobError::InvalidInput);
                }
                FormatSpec::Mp4 { max_height }
            }
            JobKind::GenericFile => return Err(JobError::InvalidInput),
        };
        Ok(Self {
            url: url.to_string(),
            format,
            work_dir,
            socket_timeout_secs: 60,
            retries: 5,
            ffmpeg_location,
        })
    }

    fn build_args(&self) -> Vec<String> {
        let template = format!("{}/%(title)s.%(ext)s", self.work_dir.display());
        let mut args = vec![
            "--newline".to_string(),
            "--no-warnings".to_string(),
            "--no-playlist".to_string(),
            "--write-info-json".to_string(),
            "-o".to_string(),
            template,
            "--socket-timeout".to_string(),
            self.socket_timeout_secs.to_string(),
            "--retries".to_string(),
            self.retries.to_string(),
        ];
        if let Some(ffmpeg) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(ffmpeg.display().to_string());
        }
        match self.format {
            FormatSpec::Mp3 { bitrate_kbps } => {
                args.extend(
                    [
                        "-f",
                        "bestaudio/best",
                        "--extract-audio",
                        "--audio-format",
                        "mp3",
                        "--audio-quality",
                    ]
                    .map(String::from),
                );
                args.push(format!("{}k", bitrate_kbps));
            }
            FormatSpec::Mp4 { max_height } => {
                args.push("-f".to_string());
                args.push(format!(
                    "bestvideo[height<={h}]+bestaudio/best[height<={h}]",
                    h = max_height
                ));
                args.push("--merge-output-format".to_string());
                args.push("mp4".to_string());
            }
        }
        args.push(self.url.clone());
        args
    }
}

/// Metadata sidecar written by `--write-info-json`.
#[derive(Debug, Deserialize)]
struct InfoJson {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

/// Run one retrieval to completion. Blocking; executed on the worker pool.
///
/// The stop flag is the supervisor's cooperative cancellation signal: it is
/// checked between progress lines and while waiting for exit, and a stopped
/// run kills the subprocess and removes its partial output.
pub fn run_retrieval(
    yt_dlp: &Path,
    options: &RetrievalOptions,
    cell: &ProgressCell,
    stop: &AtomicBool,
) -> Result<JobResult, JobError> {
    std::fs::create_dir_all(&options.work_dir)?;

    let args = options.build_args();
    debug!("yt-dlp {}", args.join(" "));

    let mut child = Command::new(yt_dlp)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                JobError::ToolMissing { tool: "yt-dlp" }
            } else {
                JobError::Io(e)
            }
        })?;

    // Collect stderr on its own thread; keep only a bounded tail for the
    // error report.
    let stderr_tail = Arc::new(Mutex::new(Vec::<String>::new()));
    if let Some(stderr) = child.stderr.take() {
        let tail = Arc::clone(&stderr_tail);
        std::thread::spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                debug!("yt-dlp stderr: {}", line);
                let mut tail = tail.lock().unwrap_or_else(|e| e.into_inner());
                tail.push(line);
                if tail.len() > 50 {
                    tail.remove(0);
                }
            }
        });
    }

    if let Some(stdout) = child.stdout.take() {
        for line in BufReader::new(stdout).lines().map_while(Result::ok) {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            if let Some(snapshot) = parse_progress_line(&line) {
                cell.publish(snapshot);
            }
        }
    }

    // Reap the child, honouring the stop flag while it drains.
    let status = loop {
        if stop.load(Ordering::Relaxed) {
            warn!("retrieval cancelled, killing yt-dlp");
            let _ = child.kill();
            let _ = child.wait();
            let _ = std::fs::remove_dir_all(&options.work_dir);
            return Err(JobError::Timeout);
        }
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => std::thread::sleep(Duration::from_millis(200)),
            Err(e) => return Err(JobError::Io(e)),
        }
    };

    if !status.success() {
        let tail = stderr_tail
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .join("\n");
        let _ = std::fs::remove_dir_all(&options.work_dir);
        return Err(JobError::from_upstream(tail));
    }

    let result = collect_result(options);
    if result.is_err() {
        let _ = std::fs::remove_dir_all(&options.work_dir);
    }
    result
}

/// Parse one `--newline` progress line.
///
/// `[download]  45.3% of ~50.12MiB at  2.56MiB/s ETA 00:12` yields a
/// Downloading snapshot; post-processor banners mark the Processing phase.
pub fn parse_progress_line(line: &str) -> Option<Snapshot> {
    if line.contains("[ExtractAudio]")
        || line.contains("[Merger]")
        || line.contains("[FFmpeg]")
        || line.contains("[VideoConvertor]")
    {
        return Some(Snapshot {
            phase: Phase::Processing,
            ..Default::default()
        });
    }

    if !line.starts_with("[download]") || !line.contains('%') {
        return None;
    }
    let parts: Vec<&str> = line.split_whitespace().collect();
    let percent = parts
        .iter()
        .find(|p| p.ends_with('%'))
        .and_then(|p| p.trim_end_matches('%').parse::<f32>().ok())?;

    let token_after = |keyword: &str| -> Option<String> {
        parts
            .iter()
            .position(|p| *p == keyword)
            .and_then(|i| parts.get(i + 1))
            .map(|s| s.to_string())
    };

    Some(Snapshot {
        phase: Phase::Downloading,
        percent: Some(percent.clamp(0.0, 100.0)),
        speed: token_after("at"),
        eta: token_after("ETA"),
    })
}

/// Locate the finished media file and its metadata sidecar in the job's
/// working directory, and delete the sidecar once parsed.
fn collect_result(options: &RetrievalOptions) -> Result<JobResult, JobError> {
    let mut info_path = None;
    let mut media_path = None;

    for entry in std::fs::read_dir(&options.work_dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name.ends_with(".info.json") {
            info_path = Some(path);
        } else if !name.ends_with(".part") && !name.ends_with(".ytdl") {
            media_path = Some(path);
        }
    }

    let local_path = media_path.ok_or_else(|| {
        JobError::Upstream("retrieval finished but produced no output file".to_string())
    })?;

    let info = match &info_path {
        Some(path) => {
            let parsed = std::fs::read_to_string(path)
                .ok()
                .and_then(|raw| serde_json::from_str::<InfoJson>(&raw).ok());
            let _ = std::fs::remove_file(path);
            parsed
        }
        None => None,
    };

    let fallback_title = match options.format {
        FormatSpec::Mp3 { .. } => "Audio",
        FormatSpec::Mp4 { .. } => "Video",
    };
    let display_title = info
        .as_ref()
        .and_then(|i| i.title.clone())
        .unwrap_or_else(|| fallback_title.to_string());

    let byte_size = std::fs::metadata(&local_path)?.len();

    let media = info.map(|i| MediaMetadata {
        uploader: i.uploader,
        duration_secs: i.duration.map(|d| d as u32),
        width: i.width,
        height: i.height,
    });

    Ok(JobResult {
        local_path,
        display_title,
        byte_size,
        media: Some(media.unwrap_or_default()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_download_progress_line() {
        let line = "[download]  45.3% of ~50.12MiB at  2.56MiB/s ETA 00:12";
        let snapshot = parse_progress_line(line).unwrap();
        assert_eq!(snapshot.phase, Phase::Downloading);
        assert_eq!(snapshot.percent, Some(45.3));
        assert_eq!(snapshot.speed.as_deref(), Some("2.56MiB/s"));
        assert_eq!(snapshot.eta.as_deref(), Some("00:12"));
    }

    #[test]
    fn parses_postprocessor_banner_as_processing() {
        for line in [
            "[ExtractAudio] Destination: downloads/song.mp3",
            "[Merger] Merging formats into \"downloads/clip.mp4\"",
        ] {
            let snapshot = parse_progress_line(line).unwrap();
            assert_eq!(snapshot.phase, Phase::Processing);
        }
    }

    #[test]
    fn ignores_unrelated_lines() {
        assert!(parse_progress_line("[youtube] abc: Downloading webpage").is_none());
        assert!(parse_progress_line("[download] Destination: downloads/x.webm").is_none());
        assert!(parse_progress_line("").is_none());
    }

    #[test]
    fn clamps_out_of_range_percent() {
        let line = "[download] 100.2% of 10.00MiB at 1.00MiB/s ETA 00:00";
        let snapshot = parse_progress_line(line).unwrap();
        assert_eq!(snapshot.percent, Some(100.0));
    }

    #[test]
    fn audio_args_include_transcode_chain() {
        let options = RetrievalOptions::new(
            "https://youtube.com/watch?v=abc",
            JobKind::Audio { bitrate_kbps: 192 },
            PathBuf::from("/tmp/job"),
            None,
        )
        .unwrap();
        let args = options.build_args();
        assert!(args.contains(&"--extract-audio".to_string()));
        assert!(args.contains(&"192k".to_string()));
        assert!(args.contains(&"--write-info-json".to_string()));
        assert_eq!(args.last().unwrap(), "https://youtube.com/watch?v=abc");
    }

    #[test]
    fn video_args_cap_height_and_merge() {
        let options = RetrievalOptions::new(
            "https://youtube.com/watch?v=abc",
            JobKind::Video { max_height: 720 },
            PathBuf::from("/tmp/job"),
            Some(PathBuf::from("/usr/bin/ffmpeg")),
        )
        .unwrap();
        let args = options.build_args();
        assert!(args.contains(&"bestvideo[height<=720]+bestaudio/best[height<=720]".to_string()));
        assert!(args.contains(&"mp4".to_string()));
        assert!(args.contains(&"--ffmpeg-location".to_string()));
    }

    #[test]
    fn rejects_qualities_not_on_the_menu() {
        let err = RetrievalOptions::new(
            "https://youtube.com/watch?v=abc",
            JobKind::Audio { bitrate_kbps: 999 },
            PathBuf::from("/tmp/job"),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, JobError::InvalidInput));

        let err = RetrievalOptions::new(
            "https://youtube.com/watch?v=abc",
            JobKind::Video { max_height: 2160 },
            PathBuf::from("/tmp/job"),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, JobError::InvalidInput));
    }
}
