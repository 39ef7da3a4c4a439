//! Startup checks module for fetchd
//!
//! Preflight checks verifying the external tools the media engine shells out
//! to are actually invocable before the daemon starts serving:
//! - yt-dlp availability check
//! - FFmpeg availability check (needed for merge and audio extraction)

use std::process::Command;
use thiserror::Error;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("yt-dlp not available: {0}")]
    YtDlpUnavailable(String),

    #[error("ffmpeg not available: {0}")]
    FfmpegUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parse the version string printed by `yt-dlp --version`.
///
/// Releases are date-stamped (e.g. `2025.01.26`); the first whitespace-
/// delimited token of the first line is the version.
pub fn parse_ytdlp_version(version_output: &str) -> Option<String> {
    let token = version_output.lines().next()?.split_whitespace().next()?;
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Check that yt-dlp is invocable by running `yt-dlp --version`.
///
/// Returns the reported version on success.
pub fn check_ytdlp_available() -> Result<String, StartupError> {
    let output = Command::new("yt-dlp").arg("--version").output().map_err(|e| {
        StartupError::YtDlpUnavailable(format!(
            "yt-dlp --version failed; is yt-dlp installed and in PATH? Error: {}",
            e
        ))
    })?;

    if !output.status.success() {
        return Err(StartupError::YtDlpUnavailable(
            "yt-dlp --version failed; is yt-dlp installed and in PATH?".to_string(),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_ytdlp_version(&stdout).ok_or_else(|| {
        StartupError::YtDlpUnavailable("yt-dlp --version printed no version".to_string())
    })
}

/// Check that FFmpeg is invocable by running `ffmpeg -version`.
///
/// yt-dlp needs it for stream merging and audio extraction, so a missing
/// ffmpeg would only surface as confusing mid-job failures.
pub fn check_ffmpeg_available() -> Result<(), StartupError> {
    let output = Command::new("ffmpeg").arg("-version").output().map_err(|e| {
        StartupError::FfmpegUnavailable(format!("Failed to run ffmpeg -version: {}", e))
    })?;

    if !output.status.success() {
        return Err(StartupError::FfmpegUnavailable(
            "ffmpeg -version failed".to_string(),
        ));
    }

    Ok(())
}

/// Run all startup checks in order
///
/// Checks are run in the following order:
/// 1. yt-dlp availability
/// 2. FFmpeg availability
pub fn run_startup_checks() -> Result<(), StartupError> {
    check_ytdlp_available()?;
    check_ffmpeg_available()?;
    Ok(())
}
