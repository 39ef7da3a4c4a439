//! Media engine adapter for fetchd
//!
//! The engine performs the actual network retrieval and format conversion.
//! It sits behind the [`MediaEngine`] trait: callers hand it a request and a
//! progress callback and get back a terminal outcome. Internal retry or
//! extractor-fallback behavior is not surfaced as progress.

use crate::registry::FormatSpec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub mod ytdlp;

pub use ytdlp::{format_selector, parse_progress_line, YtDlpEngine};

/// Callback invoked with 0-100 progress percentages.
///
/// Delivery order is not guaranteed; the job registry enforces the monotonic
/// floor on the receiving side.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Error type for engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// Failed to launch or talk to the retrieval tool
    #[error("retrieval tool IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Retrieval tool exited with a non-zero status
    #[error("retrieval failed (exit code {code}): {detail}")]
    Fetch { code: i32, detail: String },

    /// Retrieval tool was terminated by a signal
    #[error("retrieval tool was terminated by signal")]
    Terminated,

    /// Tool reported success but the artifact is not on disk
    #[error("artifact missing after retrieval: {}", .0.display())]
    MissingArtifact(PathBuf),

    /// Tool reported success but the artifact is empty
    #[error("artifact is empty: {}", .0.display())]
    EmptyArtifact(PathBuf),

    /// Metadata probe failed
    #[error("metadata probe failed: {0}")]
    Probe(String),

    /// Metadata probe produced unreadable output
    #[error("unreadable probe output: {0}")]
    ProbeParse(#[from] serde_json::Error),
}

/// One retrieval/transcode request handed to the engine.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Media URL to retrieve.
    pub source_url: String,
    /// Output target.
    pub format_spec: FormatSpec,
    /// Where the finished artifact must land.
    pub output_path: PathBuf,
}

/// Basic media metadata returned by the probe operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MediaInfo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default, rename = "duration")]
    pub duration_secs: f64,
    #[serde(default)]
    pub uploader: String,
}

/// External collaborator performing retrieval and format conversion.
///
/// Implementations must invoke the progress callback only from the single
/// fetch call it was handed to, and must return exactly one terminal outcome
/// per fetch.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Retrieve the media and produce the artifact at the requested path.
    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: ProgressFn,
    ) -> Result<PathBuf, EngineError>;

    /// Look up title/thumbnail/duration metadata without downloading.
    async fn probe(&self, source_url: &str) -> Result<MediaInfo, EngineError>;
}
