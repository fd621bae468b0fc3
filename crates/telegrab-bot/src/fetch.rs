//! Generic fetcher: streamed HTTP GET for links no extractor recognizes.
//!
//! Goes `Downloading → Done` with no Processing phase. Percent is only
//! reported when the server declares a Content-Length. Connect/read
//! timeouts come from the caller's client; the only overall deadline is
//! the supervisor's.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use telegrab_core::error::JobError;

use crate::job::JobResult;
use crate::progress::{Phase, ProgressCell, Snapshot};

/// Derive the local filename from a Content-Disposition header, falling back
/// to the last URL path segment.
pub fn derive_filename(url: &str, content_disposition: Option<&str>) -> String {
    if let Some(header) = content_disposition {
        if let Some(raw) = header.split("filename=").nth(1) {
            let name = raw.split(';').next().unwrap_or(raw).trim().trim_matches('"');
            if !name.is_empty() {
                return sanitize_filename(name);
            }
        }
    }

    let name = url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|segments| segments.last().map(|s| s.to_string()))
        })
        .unwrap_or_default();
    if name.is_empty() {
        "downloaded_file".to_string()
    } else {
        sanitize_filename(&name)
    }
}

/// Keep the name a plain basename: no separators, no parent traversal.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "downloaded_file".to_string()
    } else {
        cleaned
    }
}

/// Stream `url` into `work_dir`. Checks the stop flag between chunks; a
/// stopped fetch removes its partial file and reports `Timeout`.
pub async fn fetch_generic(
    http: &reqwest::Client,
    url: &str,
    work_dir: &Path,
    cell: &ProgressCell,
    stop: &AtomicBool,
) -> Result<JobResult, JobError> {
    tokio::fs::create_dir_all(work_dir).await?;

    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| JobError::Upstream(format!("request failed: {e}")))?;

    let response = response
        .error_for_status()
        .map_err(|e| JobError::Upstream(format!("server returned error: {e}")))?;

    let content_disposition = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let total_bytes = response.content_length();
    let filename = derive_filename(url, content_disposition.as_deref());
    let dest: PathBuf = work_dir.join(&filename);

    debug!("fetching {} to {}", url, dest.display());

    let mut file = tokio::fs::File::create(&dest).await?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        if stop.load(Ordering::Relaxed) {
            warn!("generic fetch cancelled, removing partial file");
            drop(file);
            let _ = tokio::fs::remove_file(&dest).await;
            return Err(JobError::Timeout);
        }
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(&dest).await;
                return Err(JobError::Upstream(format!("stream error: {e}")));
            }
        };
        if let Err(e) = file.write_all(&chunk).await {
            drop(file);
            let _ = tokio::fs::remove_file(&dest).await;
            return Err(JobError::Io(e));
        }
        downloaded += chunk.len() as u64;

        let percent =
            total_bytes.map(|total| (downloaded as f32 / total.max(1) as f32 * 100.0).min(100.0));
        cell.publish(Snapshot {
            phase: Phase::Downloading,
            percent,
            speed: None,
            eta: None,
        });
    }
    file.flush().await?;

    // Size from the file on disk, not the declared Content-Length.
    let byte_size = tokio::fs::metadata(&dest).await?.len();

    Ok(JobResult {
        local_path: dest,
        display_title: filename,
        byte_size,
        media: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_from_url_path() {
        assert_eq!(
            derive_filename("https://example.com/files/report.pdf", None),
            "report.pdf"
        );
    }

    #[test]
    fn filename_from_content_disposition_overrides_url() {
        assert_eq!(
            derive_filename(
                "https://example.com/dl?id=5",
                Some("attachment; filename=\"archive.zip\"")
            ),
            "archive.zip"
        );
        assert_eq!(
            derive_filename(
                "https://example.com/x.bin",
                Some("attachment; filename=plain.bin; size=12")
            ),
            "plain.bin"
        );
    }

    #[test]
    fn filename_falls_back_when_path_is_empty() {
        assert_eq!(derive_filename("https://example.com/", None), "downloaded_file");
        assert_eq!(derive_filename("not a url", None), "downloaded_file");
    }

    #[test]
    fn filename_is_sanitized() {
        assert_eq!(
            derive_filename(
                "https://example.com/x",
                Some("attachment; filename=\"../../etc/passwd\"")
            ),
            "_.._etc_passwd"
        );
    }
}
