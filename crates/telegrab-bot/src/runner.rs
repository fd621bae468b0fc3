//! Blocking job runner: executes one retrieval-or-fetch operation on a
//! bounded worker pool so it never stalls the event loop.
//!
//! Admission control is a FIFO semaphore shared by every job in the
//! process; submission queues when the pool is saturated.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::info;

use telegrab_core::config::LimitsConfig;
use telegrab_core::error::JobError;
use telegrab_core::platform;

use crate::fetch;
use crate::job::{JobKind, JobRequest, JobResult};
use crate::progress::{Phase, ProgressCell};
use crate::ytdlp::{self, RetrievalOptions};

/// A submitted job: the future producing its result plus the cooperative
/// stop flag the supervisor raises on deadline.
pub struct RunningJob {
    pub handle: JoinHandle<Result<JobResult, JobError>>,
    pub stop: Arc<AtomicBool>,
}

pub struct JobRunner {
    pool: Arc<Semaphore>,
    http: reqwest::Client,
    downloads_dir: PathBuf,
    yt_dlp: Option<PathBuf>,
    ffmpeg: Option<PathBuf>,
}

impl JobRunner {
    pub fn new(downloads_dir: PathBuf, limits: &LimitsConfig) -> anyhow::Result<Self> {
        // Connect/read timeouts only; the supervisor owns the per-job
        // deadline.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(limits.fetch_timeout_secs))
            .read_timeout(Duration::from_secs(limits.fetch_timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        let yt_dlp = platform::find_yt_dlp_binary();
        let ffmpeg = platform::find_ffmpeg_binary();
        info!(
            "job runner: pool={} yt-dlp={:?} ffmpeg={:?}",
            limits.worker_pool_size, yt_dlp, ffmpeg
        );
        Ok(Self {
            pool: Arc::new(Semaphore::new(limits.worker_pool_size)),
            http,
            downloads_dir,
            yt_dlp,
            ffmpeg,
        })
    }

    /// Submit one job. The returned task resolves to the job result; the
    /// worker itself writes phases into `cell` as it goes.
    pub fn submit(&self, request: JobRequest, cell: ProgressCell) -> RunningJob {
        let stop = Arc::new(AtomicBool::new(false));
        let pool = Arc::clone(&self.pool);
        let http = self.http.clone();
        let work_dir = self.job_dir();
        let yt_dlp = self.yt_dlp.clone();
        let ffmpeg = self.ffmpeg.clone();
        let stop_flag = Arc::clone(&stop);

        let handle = tokio::spawn(async move {
            let _permit = pool
                .acquire_owned()
                .await
                .map_err(|_| JobError::Upstream("worker pool closed".to_string()))?;
            cell.set_phase(Phase::Initializing);

            let result = match request.kind {
                JobKind::GenericFile => {
                    fetch::fetch_generic(&http, &request.url, &work_dir, &cell, &stop_flag).await
                }
                kind => {
                    let yt_dlp = yt_dlp.ok_or(JobError::ToolMissing { tool: "yt-dlp" })?;
                    let options = RetrievalOptions::new(&request.url, kind, work_dir, ffmpeg)?;
                    let worker_cell = cell.clone();
                    tokio::task::spawn_blocking(move || {
                        ytdlp::run_retrieval(&yt_dlp, &options, &worker_cell, &stop_flag)
                    })
                    .await
                    .map_err(|e| JobError::Upstream(format!("worker panicked: {e}")))?
                }
            };

            if result.is_ok() {
                cell.set_phase(Phase::Done);
            }
            result
        });

        RunningJob { handle, stop }
    }

    /// A fresh per-job working directory under the downloads dir, so
    /// concurrent jobs never collide and cleanup is a directory removal.
    fn job_dir(&self) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        self.downloads_dir.join(format!("job-{nanos}"))
    }
}
