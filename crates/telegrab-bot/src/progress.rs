//! Progress state cell and the status-message renderer.
//!
//! One writer (the blocking worker) publishes snapshots into a watch
//! channel; the renderer polls the latest value on a fixed cadence and
//! turns it into the animated status text. Publishing through the channel
//! keeps the handoff atomic under the multi-threaded worker pool.

use std::sync::Arc;

use tokio::sync::watch;

use crate::job::JobKind;

/// Coarse progress stage of a job. Transitions are monotonic; `Done` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Phase {
    #[default]
    Initializing,
    Downloading,
    Processing,
    Done,
}

/// Latest known progress fields, as last written by the worker.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub phase: Phase,
    pub percent: Option<f32>,
    pub speed: Option<String>,
    pub eta: Option<String>,
}

/// Single-writer progress cell. Cloned into the worker; the renderer reads
/// the latest snapshot without consuming it.
#[derive(Clone)]
pub struct ProgressCell {
    tx: Arc<watch::Sender<Snapshot>>,
}

impl Default for ProgressCell {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Snapshot::default());
        Self { tx: Arc::new(tx) }
    }

    /// Publish a new snapshot. Phase regressions are rejected at the write
    /// site so readers observe phases in non-decreasing order even if the
    /// worker's callbacks arrive out of order.
    pub fn publish(&self, next: Snapshot) {
        self.tx.send_modify(|current| {
            if next.phase >= current.phase {
                *current = next;
            }
        });
    }

    /// Advance the phase, keeping the other fields.
    pub fn set_phase(&self, phase: Phase) {
        self.tx.send_modify(|current| {
            if phase >= current.phase {
                current.phase = phase;
            }
        });
    }

    pub fn read(&self) -> Snapshot {
        self.tx.borrow().clone()
    }
}

/// 11-step progress bar, index = min(percent / 10, 10).
const PROGRESS_BARS: [&str; 11] = [
    "▱▱▱▱▱▱▱▱▱▱",
    "▰▱▱▱▱▱▱▱▱▱",
    "▰▰▱▱▱▱▱▱▱▱",
    "▰▰▰▱▱▱▱▱▱▱",
    "▰▰▰▰▱▱▱▱▱▱",
    "▰▰▰▰▰▱▱▱▱▱",
    "▰▰▰▰▰▰▱▱▱▱",
    "▰▰▰▰▰▰▰▱▱▱",
    "▰▰▰▰▰▰▰▰▱▱",
    "▰▰▰▰▰▰▰▰▰▱",
    "▰▰▰▰▰▰▰▰▰▰",
];

const DOWNLOAD_FRAMES: [&str; 6] = ["📥", "📥▪", "📥▪▪", "📥▪▪▪", "📥▪▪▪▪", "📥▪▪▪▪▪"];
const AUDIO_PROCESSING_FRAMES: [&str; 6] = ["🎵", "🎵♪", "🎵♪♫", "🎵♪♫♪", "🎵♪♫", "🎵♪"];
const VIDEO_PROCESSING_FRAMES: [&str; 5] = ["🎬", "🎬🎞️", "🎬🎞️📹", "🎬🎞️", "🎬"];
const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
pub const UPLOAD_FRAMES: [&str; 6] = ["📤", "📤▫", "📤▫▫", "📤▫▫▫", "📤▫▫▫▫", "📤▫▫▫▫▫"];

/// Discretize a percentage into a bar index. Clamped to [0, 10].
pub fn bar_index(percent: f32) -> usize {
    if percent <= 0.0 {
        return 0;
    }
    ((percent / 10.0) as usize).min(10)
}

fn progress_bar(percent: Option<f32>) -> &'static str {
    PROGRESS_BARS[percent.map(bar_index).unwrap_or(0)]
}

/// Formats status text from snapshots and suppresses redundant re-renders.
///
/// The frame counter only selects animation glyphs; it is independent of
/// progress percent. The caller is responsible for the 1.5 s cadence and
/// for pushing the returned text to the chat.
pub struct Renderer {
    kind: JobKind,
    cell: ProgressCell,
    frame: usize,
    last_rendered: String,
}

impl Renderer {
    pub fn new(kind: JobKind, cell: ProgressCell) -> Self {
        Self {
            kind,
            cell,
            frame: 0,
            last_rendered: String::new(),
        }
    }

    /// Read the cell, format the status text and return it only when it
    /// differs from the previously returned text. `Done` means the job has
    /// already completed; nothing is rendered for it.
    pub fn next_frame(&mut self) -> Option<String> {
        let snapshot = self.cell.read();
        if snapshot.phase == Phase::Done {
            return None;
        }
        let text = self.format(&snapshot);
        self.frame += 1;
        if text == self.last_rendered {
            return None;
        }
        self.last_rendered = text.clone();
        Some(text)
    }

    fn format(&self, snapshot: &Snapshot) -> String {
        match snapshot.phase {
            Phase::Processing => self.format_processing(),
            Phase::Downloading => self.format_downloading(snapshot),
            Phase::Initializing | Phase::Done => self.format_initializing(),
        }
    }

    fn format_downloading(&self, snapshot: &Snapshot) -> String {
        let icon = DOWNLOAD_FRAMES[self.frame % DOWNLOAD_FRAMES.len()];
        let bar = progress_bar(snapshot.percent);
        let percent = snapshot
            .percent
            .map(|p| format!("{:.1}%", p))
            .unwrap_or_else(|| "0%".to_string());
        let speed = snapshot.speed.as_deref().unwrap_or("N/A");
        let eta = snapshot.eta.as_deref().unwrap_or("N/A");

        match self.kind {
            JobKind::Audio { .. } => format!(
                "{icon} Downloading Audio\n\n\
                 📊 {bar} {percent}\n\
                 ⚡ Speed: {speed}\n\
                 ⏱️ ETA: {eta}\n\
                 🎵 Quality: {}",
                self.kind.quality_label()
            ),
            JobKind::Video { .. } => format!(
                "{icon} Downloading Video\n\n\
                 📊 {bar} {percent}\n\
                 ⚡ Speed: {speed}\n\
                 ⏱️ ETA: {eta}\n\
                 🎥 Quality: {}",
                self.kind.quality_label()
            ),
            JobKind::GenericFile => {
                let spinner = SPINNER[self.frame % SPINNER.len()];
                format!(
                    "{icon} Downloading File\n\n\
                     {spinner} Fetching from server\n\
                     📊 {bar} {percent}\n\
                     ⏳ Please wait..."
                )
            }
        }
    }

    fn format_processing(&self) -> String {
        let spinner = SPINNER[self.frame % SPINNER.len()];
        match self.kind {
            JobKind::Audio { .. } => {
                let icon = AUDIO_PROCESSING_FRAMES[self.frame % AUDIO_PROCESSING_FRAMES.len()];
                format!(
                    "{icon} Converting to MP3...\n\n\
                     {spinner} Processing audio track\n\
                     🎧 Quality: {}\n\
                     ⚙️ Using FFmpeg encoder",
                    self.kind.quality_label()
                )
            }
            JobKind::Video { .. } => {
                let icon = VIDEO_PROCESSING_FRAMES[self.frame % VIDEO_PROCESSING_FRAMES.len()];
                format!(
                    "{icon} Processing Video...\n\n\
                     {spinner} Merging video & audio\n\
                     🎥 Quality: {}\n\
                     ⚙️ Using FFmpeg encoder",
                    self.kind.quality_label()
                )
            }
            // The generic fetcher never enters Processing; fall back to the
            // neutral spinner text if it somehow does.
            JobKind::GenericFile => format!("{spinner} Processing file..."),
        }
    }

    fn format_initializing(&self) -> String {
        let spinner = SPINNER[self.frame % SPINNER.len()];
        match self.kind {
            JobKind::Audio { .. } => format!(
                "{spinner} Initializing download...\n\n\
                 🔍 Fetching media information\n\
                 🌐 Connecting to source\n\
                 🎵 Target: {} MP3",
                self.kind.quality_label()
            ),
            JobKind::Video { .. } => format!(
                "{spinner} Initializing download...\n\n\
                 🔍 Fetching media information\n\
                 🌐 Connecting to source\n\
                 🎥 Target: {} MP4",
                self.kind.quality_label()
            ),
            JobKind::GenericFile => format!(
                "{spinner} Initializing download...\n\n\
                 🔍 Analyzing file\n\
                 🌐 Connecting...\n\
                 ⏳ Please wait..."
            ),
        }
    }
}
