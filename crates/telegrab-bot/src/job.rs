//! Job request/result types shared by the runner and supervisor.

use std::path::PathBuf;

/// What to fetch and how. Immutable once constructed; one per job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub url: String,
    pub kind: JobKind,
}

/// The three operation kinds, with the resolved quality baked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Best audio transcoded to mp3 at the given bitrate.
    Audio { bitrate_kbps: u32 },
    /// Best video+audio capped at the given height, merged into mp4.
    Video { max_height: u32 },
    /// Plain HTTP fetch of an arbitrary file.
    GenericFile,
}

impl JobKind {
    /// Quality annotation shown in progress/status messages.
    pub fn quality_label(&self) -> String {
        match self {
            JobKind::Audio { bitrate_kbps } => format!("{} kbps", bitrate_kbps),
            JobKind::Video { max_height } => format!("{}p", max_height),
            JobKind::GenericFile => String::new(),
        }
    }

    pub fn is_media(&self) -> bool {
        !matches!(self, JobKind::GenericFile)
    }
}

/// Produced exactly once per successful job. The file at `local_path` exists
/// from the moment the result is constructed until the supervisor's cleanup
/// step deletes it.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub local_path: PathBuf,
    pub display_title: String,
    /// Measured from the file on disk, never from declared headers.
    pub byte_size: u64,
    pub media: Option<MediaMetadata>,
}

#[derive(Debug, Clone, Default)]
pub struct MediaMetadata {
    pub uploader: Option<String>,
    pub duration_secs: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}
