//! yt-dlp engine for fetchd
//!
//! Builds and executes yt-dlp commands for retrieval jobs and metadata
//! probes, translating `--newline` progress output into percentage callbacks.

use super::{EngineError, FetchRequest, MediaEngine, MediaInfo, ProgressFn};
use crate::registry::FormatSpec;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

/// Uncapped video selector: prefer an mp4/m4a pair that can be merged without
/// re-encoding, fall back to anything.
const VIDEO_BEST_SELECTOR: &str =
    "bestvideo[ext=mp4]+bestaudio[ext=m4a]/bestvideo+bestaudio/best";

/// Bitrate handed to the audio extractor.
const AUDIO_QUALITY: &str = "192K";

/// yt-dlp format selector string for a format spec.
pub fn format_selector(spec: FormatSpec) -> String {
    if spec == FormatSpec::AudioExtract {
        return "bestaudio/best".to_string();
    }
    match spec.height_limit() {
        Some(h) => format!(
            "bestvideo[height<={h}][ext=mp4]+bestaudio[ext=m4a]\
             /bestvideo[height<={h}]+bestaudio/best[height<={h}]/best"
        ),
        None => VIDEO_BEST_SELECTOR.to_string(),
    }
}

/// Parse one yt-dlp `--newline` progress line into a percentage.
///
/// Lines look like `[download]  45.3% of 10.00MiB at ...`. Returns None for
/// anything else (destination lines, merge output, partial fragments).
pub fn parse_progress_line(line: &str) -> Option<u8> {
    let rest = line.strip_prefix("[download]")?.trim_start();
    let token = rest.split_whitespace().next()?;
    let percent = token.strip_suffix('%')?;
    let value: f64 = percent.parse().ok()?;
    if !(0.0..=100.0).contains(&value) {
        return None;
    }
    Some(value.floor() as u8)
}

/// Last non-empty line of tool stderr, for error messages.
fn error_detail(stderr: &str) -> String {
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no error output")
        .to_string()
}

/// Media engine backed by the yt-dlp command-line tool.
pub struct YtDlpEngine {
    /// Program name or path used to invoke the tool.
    tool_path: String,
    /// Optional cookies file forwarded to the tool.
    cookies_file: Option<PathBuf>,
    /// Download size cap in megabytes.
    max_file_size_mb: u64,
}

impl YtDlpEngine {
    pub fn new(cookies_file: Option<PathBuf>, max_file_size_mb: u64) -> Self {
        Self {
            tool_path: "yt-dlp".to_string(),
            cookies_file,
            max_file_size_mb,
        }
    }

    /// Override the tool binary (used by tests and non-PATH deployments).
    pub fn with_tool_path(mut self, path: impl Into<String>) -> Self {
        self.tool_path = path.into();
        self
    }

    /// `--cookies <file>` when a non-empty cookies file is present.
    ///
    /// The file may be cleared without being removed, so emptiness is checked
    /// at invocation time rather than at construction.
    fn cookie_args(&self) -> Vec<String> {
        if let Some(path) = &self.cookies_file {
            let non_empty = std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
            if non_empty {
                return vec!["--cookies".to_string(), path.display().to_string()];
            }
        }
        Vec::new()
    }

    /// Build the retrieval command for a request.
    ///
    /// The output template pins the artifact to the request's output path
    /// (modulo the tool-chosen intermediate extension); extraction/merge
    /// settings guarantee the final extension matches the format spec.
    pub fn build_fetch_command(&self, request: &FetchRequest) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.tool_path);

        cmd.arg("--newline");
        cmd.arg("--no-warnings");
        cmd.arg("--max-filesize")
            .arg(format!("{}M", self.max_file_size_mb));

        for arg in self.cookie_args() {
            cmd.arg(arg);
        }

        cmd.arg("-f").arg(format_selector(request.format_spec));

        match request.format_spec {
            FormatSpec::AudioExtract => {
                cmd.arg("-x");
                cmd.arg("--audio-format").arg("mp3");
                cmd.arg("--audio-quality").arg(AUDIO_QUALITY);
            }
            _ => {
                cmd.arg("--merge-output-format").arg("mp4");
            }
        }

        cmd.arg("-o")
            .arg(request.output_path.with_extension("%(ext)s"));
        cmd.arg(&request.source_url);

        cmd
    }

    /// Build the metadata probe command for a URL.
    pub fn build_probe_command(&self, source_url: &str) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.tool_path);

        cmd.arg("-J");
        cmd.arg("--no-warnings");
        cmd.arg("--skip-download");

        for arg in self.cookie_args() {
            cmd.arg(arg);
        }

        cmd.arg(source_url);
        cmd
    }
}

#[async_trait]
impl MediaEngine for YtDlpEngine {
    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: ProgressFn,
    ) -> Result<PathBuf, EngineError> {
        let mut cmd = tokio::process::Command::from(self.build_fetch_command(request));
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;

        // Drain stderr concurrently so a chatty tool cannot block on a full
        // pipe while we read progress from stdout.
        let stderr_pipe = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(mut pipe) = stderr_pipe {
                let _ = pipe.read_to_string(&mut buf).await;
            }
            buf
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if let Some(pct) = parse_progress_line(&line) {
                    progress(pct);
                }
            }
        }

        let status = child.wait().await?;
        let stderr_buf = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return match status.code() {
                Some(code) => Err(EngineError::Fetch {
                    code,
                    detail: error_detail(&stderr_buf),
                }),
                None => Err(EngineError::Terminated),
            };
        }

        // Trust the artifact, not the exit code.
        let metadata = tokio::fs::metadata(&request.output_path)
            .await
            .map_err(|_| EngineError::MissingArtifact(request.output_path.clone()))?;
        if metadata.len() == 0 {
            let _ = tokio::fs::remove_file(&request.output_path).await;
            return Err(EngineError::EmptyArtifact(request.output_path.clone()));
        }

        Ok(request.output_path.clone())
    }

    async fn probe(&self, source_url: &str) -> Result<MediaInfo, EngineError> {
        let output = tokio::process::Command::from(self.build_probe_command(source_url))
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Probe(error_detail(&stderr)));
        }

        let info: MediaInfo = serde_json::from_slice(&output.stdout)?;
        Ok(info)
    }
}
