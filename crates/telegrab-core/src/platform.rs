//! Locations of external tools and application directories.
//!
//! The retrieval pipeline shells out to yt-dlp, which in turn needs ffmpeg
//! for transcoding/merging. Both are located here rather than assumed on
//! `PATH`, so the absence of either can be reported as an actionable error.

use std::path::PathBuf;

pub fn data_dir() -> PathBuf {
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("telegrab")
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("telegrab")
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("telegrab")
    }
    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("telegrab")
    }
}

#[cfg(unix)]
fn ffmpeg_binary_names() -> &'static [&'static str] {
    &["ffmpeg"]
}

#[cfg(windows)]
fn ffmpeg_binary_names() -> &'static [&'static str] {
    &["ffmpeg.exe", "ffmpeg"]
}

#[cfg(unix)]
fn yt_dlp_binary_names() -> &'static [&'static str] {
    &["yt-dlp"]
}

#[cfg(windows)]
fn yt_dlp_binary_names() -> &'static [&'static str] {
    &["yt-dlp.exe", "yt-dlp"]
}

/// Well-known install directories checked after PATH.
#[cfg(unix)]
fn ffmpeg_install_dirs() -> &'static [&'static str] {
    &["/usr/local/bin", "/opt/homebrew/bin", "/usr/bin"]
}

#[cfg(windows)]
fn ffmpeg_install_dirs() -> &'static [&'static str] {
    &[
        r"C:\ProgramData\chocolatey\bin",
        r"C:\ffmpeg\bin",
        r"C:\Program Files\ffmpeg\bin",
        r"C:\ProgramData\chocolatey\lib\ffmpeg\tools\ffmpeg\bin",
    ]
}

fn find_beside_exe(names: &[&str]) -> Option<PathBuf> {
    let current_exe = std::env::current_exe().ok()?;
    let dir = current_exe.parent()?;
    for name in names {
        let p = dir.join(name);
        if p.exists() {
            return Some(p);
        }
    }
    None
}

fn find_on_path(names: &[&str]) -> Option<PathBuf> {
    let path = std::env::var("PATH").ok()?;
    #[cfg(unix)]
    let sep = ":";
    #[cfg(windows)]
    let sep = ";";
    for dir in path.split(sep) {
        for name in names {
            let p = PathBuf::from(dir).join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }
    None
}

fn find_in_dirs(dirs: &[&str], names: &[&str]) -> Option<PathBuf> {
    for dir in dirs {
        for name in names {
            let p = PathBuf::from(dir).join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }
    None
}

/// Find the ffmpeg binary used by yt-dlp for extraction and merging.
///
/// Searches in order:
/// 1. FFMPEG_PATH environment variable (file or directory)
/// 2. PATH
/// 3. Well-known install directories
pub fn find_ffmpeg_binary() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("FFMPEG_PATH") {
        let path = PathBuf::from(p);
        if path.is_file() {
            return Some(path);
        }
        for name in ffmpeg_binary_names() {
            let candidate = path.join(name);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    if let Some(p) = find_on_path(ffmpeg_binary_names()) {
        return Some(p);
    }

    find_in_dirs(ffmpeg_install_dirs(), ffmpeg_binary_names())
}

/// Find the yt-dlp binary.
///
/// Searches in order:
/// 1. YT_DLP_PATH environment variable
/// 2. Beside the current executable
/// 3. PATH
pub fn find_yt_dlp_binary() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("YT_DLP_PATH") {
        let p = PathBuf::from(path);
        if p.exists() {
            return Some(p);
        }
    }

    if let Some(p) = find_beside_exe(yt_dlp_binary_names()) {
        return Some(p);
    }

    find_on_path(yt_dlp_binary_names())
}
