//! fetchd
//!
//! Password-gated web service that retrieves a media URL, transcodes it to a
//! requested format, and serves the artifact until a retention sweeper
//! reclaims it. Job state lives in an in-memory registry; one asynchronous
//! execution task per job drives the media engine.

pub mod daemon;
pub mod engine;
pub mod orchestrator;
pub mod registry;
pub mod server;
pub mod session;
pub mod startup;
pub mod sweeper;

pub use fetchd_config as config;
pub use fetchd_config::Config;

pub use daemon::{Daemon, DaemonError};
pub use engine::{
    format_selector, parse_progress_line, EngineError, FetchRequest, MediaEngine, MediaInfo,
    ProgressFn, YtDlpEngine,
};
pub use orchestrator::{JobOrchestrator, SubmitError};
pub use registry::{FormatSpec, Job, JobRegistry, JobState, UnknownFormat};
pub use server::{create_router, run_server, AppState, ServerError, SESSION_COOKIE};
pub use session::{AuthError, SessionGate};
pub use startup::{
    check_ffmpeg_available, check_ytdlp_available, parse_ytdlp_version, run_startup_checks,
    StartupError,
};
pub use sweeper::{RetentionSweeper, SweepStats};
