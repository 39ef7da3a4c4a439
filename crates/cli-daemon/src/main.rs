//! CLI entry point for fetchd
//!
//! Parses command line arguments, initializes logging, and starts the daemon.

use clap::Parser;
use fetchd::{Config, Daemon};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// fetchd - authenticated media retrieval daemon with retention-swept artifacts
#[derive(Parser, Debug)]
#[command(name = "fetchd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (config.toml)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the listen address from the config file
    #[arg(short, long)]
    listen: Option<String>,

    /// Skip preflight checks (yt-dlp, ffmpeg). For testing only.
    #[arg(long, default_value = "false")]
    skip_checks: bool,
}

fn init_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,fetchd=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging();

    let daemon_result = if args.skip_checks {
        tracing::warn!("skipping preflight checks (--skip-checks enabled)");
        Config::load(&args.config)
            .map_err(Into::into)
            .and_then(Daemon::with_config)
    } else {
        Daemon::new(&args.config)
    };

    match daemon_result {
        Ok(mut daemon) => {
            if let Some(listen) = args.listen {
                daemon.config.server.bind_addr = listen;
            }

            if let Err(e) = daemon.run_with_server().await {
                tracing::error!("daemon error: {}", e);
                return ExitCode::FAILURE;
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("failed to initialize daemon: {}", e);
            ExitCode::FAILURE
        }
    }
}
