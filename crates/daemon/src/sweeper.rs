//! Retention sweeper for fetchd
//!
//! Periodic background task that reclaims terminal jobs and their artifacts
//! once they outlive the retention window. Runs for the life of the process;
//! no failure inside a pass is fatal to the loop or visible to clients.

use crate::registry::{current_timestamp_ms, JobRegistry};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Outcome of a single sweeper pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Jobs transitioned into `expired` this pass.
    pub expired: usize,
    /// Artifacts that could not be deleted this pass.
    pub delete_failures: usize,
}

/// Periodic reclaimer of expired artifacts and job records.
pub struct RetentionSweeper {
    registry: Arc<JobRegistry>,
    ttl: Duration,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(registry: Arc<JobRegistry>, ttl: Duration, interval: Duration) -> Self {
        Self {
            registry,
            ttl,
            interval,
        }
    }

    /// Spawn the sweep loop as a background task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let stats = self.sweep_once();
                if stats.expired > 0 || stats.delete_failures > 0 {
                    debug!(
                        expired = stats.expired,
                        delete_failures = stats.delete_failures,
                        "sweep pass finished"
                    );
                }
            }
        })
    }

    /// One pass: expire `completed`/`failed` jobs whose terminal transition
    /// is older than the TTL, deleting their artifacts first.
    ///
    /// Jobs still `queued`/`running` are never touched. A failed delete is
    /// logged and the job stays in its terminal state for retry on the next
    /// pass, so the registry never points at an artifact it lost track of.
    pub fn sweep_once(&self) -> SweepStats {
        let cutoff = current_timestamp_ms() - self.ttl.as_millis() as i64;
        let mut stats = SweepStats::default();

        for job in self.registry.terminal_jobs_older_than(cutoff) {
            if let Some(path) = &job.output_path {
                if let Err(err) = remove_artifact(path) {
                    warn!(
                        job_id = %job.id,
                        path = %path.display(),
                        error = %err,
                        "failed to delete expired artifact, will retry next pass"
                    );
                    stats.delete_failures += 1;
                    continue;
                }
            }

            if self.registry.expire(&job.id) {
                stats.expired += 1;
            }
        }

        stats
    }
}

/// Delete an artifact, treating an already-missing file as deleted.
fn remove_artifact(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
