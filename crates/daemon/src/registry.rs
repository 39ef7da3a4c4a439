//! Job registry: the single source of truth for job state.
//!
//! Every mutation of a job record goes through the registry's atomic
//! operations. The registry holds one lock per record so unrelated jobs never
//! serialize on a single global lock; the outer map lock is only taken for
//! insert and lookup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Output target for a retrieval job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatSpec {
    /// Best available video+audio, merged into mp4.
    #[serde(rename = "video-best")]
    VideoBest,
    /// Video capped at 1080p.
    #[serde(rename = "video-1080p")]
    Video1080p,
    /// Video capped at 720p.
    #[serde(rename = "video-720p")]
    Video720p,
    /// Video capped at 480p.
    #[serde(rename = "video-480p")]
    Video480p,
    /// Audio-only extraction to mp3.
    #[serde(rename = "audio-extract")]
    AudioExtract,
}

impl FormatSpec {
    /// All recognized format specs, in wire order.
    pub const ALL: [FormatSpec; 5] = [
        FormatSpec::VideoBest,
        FormatSpec::Video1080p,
        FormatSpec::Video720p,
        FormatSpec::Video480p,
        FormatSpec::AudioExtract,
    ];

    /// Height cap for capped video formats.
    pub fn height_limit(&self) -> Option<u32> {
        match self {
            FormatSpec::Video1080p => Some(1080),
            FormatSpec::Video720p => Some(720),
            FormatSpec::Video480p => Some(480),
            FormatSpec::VideoBest | FormatSpec::AudioExtract => None,
        }
    }

    /// File extension of the finished artifact.
    pub fn artifact_extension(&self) -> &'static str {
        match self {
            FormatSpec::AudioExtract => "mp3",
            _ => "mp4",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FormatSpec::VideoBest => "video-best",
            FormatSpec::Video1080p => "video-1080p",
            FormatSpec::Video720p => "video-720p",
            FormatSpec::Video480p => "video-480p",
            FormatSpec::AudioExtract => "audio-extract",
        }
    }
}

impl std::fmt::Display for FormatSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a format spec string is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFormat(pub String);

impl std::fmt::Display for UnknownFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unrecognized format spec: {}", self.0)
    }
}

impl std::error::Error for UnknownFormat {}

impl FromStr for FormatSpec {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video-best" => Ok(FormatSpec::VideoBest),
            "video-1080p" => Ok(FormatSpec::Video1080p),
            "video-720p" => Ok(FormatSpec::Video720p),
            "video-480p" => Ok(FormatSpec::Video480p),
            "audio-extract" => Ok(FormatSpec::AudioExtract),
            other => Err(UnknownFormat(other.to_string())),
        }
    }
}

/// State of a job.
///
/// Transitions are monotonic: `queued -> running -> {completed | failed} ->
/// expired`. No transition skips `running`; `expired` has no outgoing edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job is waiting for its execution task to start.
    Queued,
    /// Job is being retrieved/transcoded.
    Running,
    /// Job finished successfully; an artifact exists.
    Completed,
    /// Job finished with an error.
    Failed,
    /// Terminal job reclaimed by the retention sweeper.
    Expired,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Queued => write!(f, "queued"),
            JobState::Running => write!(f, "running"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
            JobState::Expired => write!(f, "expired"),
        }
    }
}

/// A retrieval job tracked through its state machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    /// Opaque unique identifier (UUID v4), never reused.
    pub id: String,
    /// Media URL, immutable after creation.
    pub source_url: String,
    /// Output target, immutable after creation.
    pub format_spec: FormatSpec,
    /// Current state.
    pub state: JobState,
    /// 0-100, non-decreasing while running.
    pub progress_percent: u8,
    /// Artifact location; set only on transition into `completed`.
    pub output_path: Option<PathBuf>,
    /// Failure cause; set only on transition into `failed`.
    pub error_message: Option<String>,
    /// Unix timestamp (milliseconds) when the job was created.
    pub created_at: i64,
    /// Unix timestamp (milliseconds) of the terminal transition.
    pub terminal_at: Option<i64>,
}

impl Job {
    /// Check if the job reached `completed` or `failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, JobState::Completed | JobState::Failed)
    }

    /// Check if the job is still live (queued or running).
    pub fn is_active(&self) -> bool {
        matches!(self.state, JobState::Queued | JobState::Running)
    }
}

/// Get current timestamp in milliseconds since Unix epoch.
pub(crate) fn current_timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Concurrency-safe in-memory store of job records.
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<Mutex<Job>>>>,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Allocate a fresh id and insert a record in `queued` state.
    ///
    /// Returns a snapshot of the new record.
    pub fn create(&self, source_url: &str, format_spec: FormatSpec) -> Job {
        let job = Job {
            id: Uuid::new_v4().to_string(),
            source_url: source_url.to_string(),
            format_spec,
            state: JobState::Queued,
            progress_percent: 0,
            output_path: None,
            error_message: None,
            created_at: current_timestamp_ms(),
            terminal_at: None,
        };

        let mut map = self.jobs.write().expect("jobs map lock poisoned");
        map.insert(job.id.clone(), Arc::new(Mutex::new(job.clone())));
        job
    }

    fn record(&self, id: &str) -> Option<Arc<Mutex<Job>>> {
        let map = self.jobs.read().expect("jobs map lock poisoned");
        map.get(id).cloned()
    }

    /// Snapshot read of a job. Never blocks longer than one field update.
    pub fn get(&self, id: &str) -> Option<Job> {
        let record = self.record(id)?;
        let job = record.lock().expect("job record lock poisoned");
        Some(job.clone())
    }

    /// Transition `queued -> running`. No-op in any other state.
    pub fn start(&self, id: &str) {
        if let Some(record) = self.record(id) {
            let mut job = record.lock().expect("job record lock poisoned");
            if job.state == JobState::Queued {
                job.state = JobState::Running;
            }
        }
    }

    /// Record a progress report for a running job.
    ///
    /// No-op unless the job is `running`. The stored value is
    /// `max(current, percent)`, which defends against out-of-order callback
    /// delivery from the engine.
    pub fn update_progress(&self, id: &str, percent: u8) {
        if let Some(record) = self.record(id) {
            let mut job = record.lock().expect("job record lock poisoned");
            if job.state == JobState::Running {
                job.progress_percent = job.progress_percent.max(percent.min(100));
            }
        }
    }

    /// Transition `running -> completed` and record the artifact path.
    ///
    /// Idempotent: a no-op if the job is already terminal, so duplicate
    /// terminal callbacks from the engine cannot produce a mixed state.
    pub fn complete(&self, id: &str, output_path: PathBuf) {
        if let Some(record) = self.record(id) {
            let mut job = record.lock().expect("job record lock poisoned");
            if job.state == JobState::Running {
                job.state = JobState::Completed;
                job.progress_percent = 100;
                job.output_path = Some(output_path);
                job.terminal_at = Some(current_timestamp_ms());
            }
        }
    }

    /// Transition `running -> failed` and record the cause.
    ///
    /// Idempotent in the same way as [`JobRegistry::complete`].
    pub fn fail(&self, id: &str, error_message: &str) {
        if let Some(record) = self.record(id) {
            let mut job = record.lock().expect("job record lock poisoned");
            if job.state == JobState::Running {
                job.state = JobState::Failed;
                job.error_message = Some(error_message.to_string());
                job.terminal_at = Some(current_timestamp_ms());
            }
        }
    }

    /// Transition a terminal job into `expired`.
    ///
    /// Silently refuses jobs that are still `queued`/`running` (the sweeper
    /// must never touch a live job) or already `expired`. Returns whether the
    /// transition took effect.
    pub fn expire(&self, id: &str) -> bool {
        if let Some(record) = self.record(id) {
            let mut job = record.lock().expect("job record lock poisoned");
            if job.is_terminal() {
                job.state = JobState::Expired;
                job.output_path = None;
                return true;
            }
        }
        false
    }

    /// Snapshots of all `completed`/`failed` jobs whose terminal transition
    /// is older than `cutoff_ms`.
    pub fn terminal_jobs_older_than(&self, cutoff_ms: i64) -> Vec<Job> {
        let records: Vec<Arc<Mutex<Job>>> = {
            let map = self.jobs.read().expect("jobs map lock poisoned");
            map.values().cloned().collect()
        };

        records
            .iter()
            .filter_map(|record| {
                let job = record.lock().expect("job record lock poisoned");
                if job.is_terminal() && job.terminal_at.is_some_and(|t| t < cutoff_ms) {
                    Some(job.clone())
                } else {
                    None
                }
            })
            .collect()
    }

    /// Number of records in the registry (all states, including expired).
    pub fn len(&self) -> usize {
        self.jobs.read().expect("jobs map lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
