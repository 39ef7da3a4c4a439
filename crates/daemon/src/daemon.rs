//! Daemon startup and wiring for fetchd
//!
//! Provides the daemon entry point: configuration loading, preflight tool
//! checks, component wiring, and the long-running server + sweeper pair.

use crate::config::{Config, ConfigError};
use crate::engine::{MediaEngine, YtDlpEngine};
use crate::orchestrator::JobOrchestrator;
use crate::registry::JobRegistry;
use crate::server::{run_server, AppState, ServerError};
use crate::session::SessionGate;
use crate::startup::{check_ytdlp_available, run_startup_checks, StartupError};
use crate::sweeper::RetentionSweeper;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Error type for daemon operations
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Startup check failed
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    /// Download directory could not be prepared
    #[error("Failed to prepare download directory: {0}")]
    DownloadDir(std::io::Error),

    /// Server error
    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

/// Daemon state containing all runtime components
pub struct Daemon {
    /// Configuration loaded from file and environment
    pub config: Config,
    registry: Arc<JobRegistry>,
    state: AppState,
}

impl Daemon {
    /// Initialize the daemon with configuration from file
    ///
    /// This performs the full startup sequence:
    /// 1. Load config from file and apply environment overrides
    /// 2. Run preflight checks (yt-dlp, ffmpeg)
    /// 3. Wire registry, engine, gate and orchestrator
    pub fn new<P: AsRef<Path>>(config_path: P) -> Result<Self, DaemonError> {
        let config = Config::load(config_path)?;
        let ytdlp_version = check_ytdlp_available()?;
        run_startup_checks()?;
        info!(ytdlp = %ytdlp_version, "preflight checks passed");
        Self::with_config(config)
    }

    /// Wire the daemon from an existing configuration, skipping preflight
    /// checks. Useful for testing when external tools are not available.
    pub fn with_config(config: Config) -> Result<Self, DaemonError> {
        let download_dir = PathBuf::from(&config.engine.download_dir);
        std::fs::create_dir_all(&download_dir).map_err(DaemonError::DownloadDir)?;

        let registry = Arc::new(JobRegistry::new());
        let engine: Arc<dyn MediaEngine> = Arc::new(YtDlpEngine::new(
            config.engine.cookies_file.as_ref().map(PathBuf::from),
            config.engine.max_file_size_mb,
        ));
        let gate = Arc::new(SessionGate::new(
            config.auth.password.clone(),
            config.auth.session_secret.as_deref(),
            Duration::from_secs(config.auth.session_ttl_secs),
            Duration::from_millis(config.auth.login_delay_ms),
        ));
        let orchestrator = Arc::new(JobOrchestrator::new(
            registry.clone(),
            engine.clone(),
            download_dir,
            config.jobs.max_concurrent,
        ));

        let state = AppState {
            gate,
            registry: registry.clone(),
            orchestrator,
            engine,
        };

        Ok(Self {
            config,
            registry,
            state,
        })
    }

    /// The shared job registry.
    pub fn registry(&self) -> Arc<JobRegistry> {
        self.registry.clone()
    }

    /// Start the retention sweeper
    ///
    /// Spawns the sweep loop as a background task for the life of the process.
    pub fn start_sweeper(&self) -> tokio::task::JoinHandle<()> {
        RetentionSweeper::new(
            self.registry.clone(),
            Duration::from_secs(self.config.retention.ttl_secs),
            Duration::from_secs(self.config.retention.sweep_interval_secs),
        )
        .spawn()
    }

    /// Run the daemon with all background tasks
    ///
    /// Starts the retention sweeper and serves HTTP until the process exits.
    pub async fn run_with_server(&self) -> Result<(), DaemonError> {
        let _sweeper_handle = self.start_sweeper();

        info!(
            addr = %self.config.server.bind_addr,
            retention_ttl_secs = self.config.retention.ttl_secs,
            "fetchd serving"
        );
        run_server(self.state.clone(), &self.config.server.bind_addr).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetchd_config::{AuthConfig, EngineConfig, JobsConfig};

    fn test_config(download_dir: &Path) -> Config {
        Config {
            engine: EngineConfig {
                download_dir: download_dir.display().to_string(),
                cookies_file: None,
                max_file_size_mb: 500,
            },
            auth: AuthConfig {
                password: "hunter2".to_string(),
                session_secret: Some("test-secret".to_string()),
                session_ttl_secs: 3600,
                login_delay_ms: 0,
            },
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_with_config_creates_download_dir() {
        let dir = tempfile::tempdir().unwrap();
        let download_dir = dir.path().join("nested/downloads");

        let daemon = Daemon::with_config(test_config(&download_dir)).unwrap();

        assert!(download_dir.exists());
        assert!(daemon.registry().is_empty());
    }

    #[tokio::test]
    async fn test_with_config_honors_concurrency_cap() {
        let dir = tempfile::tempdir().unwrap();

        let mut config = test_config(dir.path());
        config.jobs = JobsConfig { max_concurrent: 2 };
        let daemon = Daemon::with_config(config).unwrap();
        assert_eq!(daemon.state.orchestrator.available_slots(), Some(2));

        let unbounded = Daemon::with_config(test_config(dir.path())).unwrap();
        assert_eq!(unbounded.state.orchestrator.available_slots(), None);
    }
}
