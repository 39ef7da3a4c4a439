//! Job orchestrator for fetchd
//!
//! Creates jobs and launches one detached execution task per job against the
//! media engine, wiring progress and terminal callbacks into the registry.
//! Submission never blocks on the engine; execution is fire-and-forget and
//! there is no cancel operation.

use crate::engine::{FetchRequest, MediaEngine, ProgressFn};
use crate::registry::{FormatSpec, Job, JobRegistry};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Error type for job submission
#[derive(Debug, Error)]
pub enum SubmitError {
    /// format_spec is not one of the recognized output targets
    #[error("unrecognized format spec: {0}")]
    InvalidFormat(String),
}

/// Creates jobs and drives their execution tasks.
///
/// Each job is mutated by exactly one execution task; the orchestrator itself
/// only ever calls the registry's atomic operations.
pub struct JobOrchestrator {
    registry: Arc<JobRegistry>,
    engine: Arc<dyn MediaEngine>,
    /// Directory artifacts are written into.
    download_dir: PathBuf,
    /// Optional cap on simultaneously running jobs. A capped job waits in
    /// `queued` until a slot opens.
    limiter: Option<Arc<Semaphore>>,
}

impl JobOrchestrator {
    /// Create an orchestrator.
    ///
    /// `max_concurrent == 0` imposes no bound on simultaneously running jobs.
    pub fn new(
        registry: Arc<JobRegistry>,
        engine: Arc<dyn MediaEngine>,
        download_dir: PathBuf,
        max_concurrent: u32,
    ) -> Self {
        let limiter = if max_concurrent > 0 {
            Some(Arc::new(Semaphore::new(max_concurrent as usize)))
        } else {
            None
        };
        Self {
            registry,
            engine,
            download_dir,
            limiter,
        }
    }

    /// Currently free execution slots, if a cap is configured.
    pub fn available_slots(&self) -> Option<usize> {
        self.limiter.as_ref().map(|s| s.available_permits())
    }

    /// Validate the format spec and enqueue a job.
    ///
    /// Returns the job id as soon as the queued record exists; the engine is
    /// invoked asynchronously. An unrecognized format is rejected here and no
    /// job record is created.
    pub fn submit(&self, source_url: &str, format_spec: &str) -> Result<String, SubmitError> {
        let format =
            FormatSpec::from_str(format_spec).map_err(|e| SubmitError::InvalidFormat(e.0))?;

        let job = self.registry.create(source_url, format);
        let id = job.id.clone();
        debug!(job_id = %id, format = %format, "job submitted");
        self.spawn_execution(job);
        Ok(id)
    }

    /// Spawn the detached execution task owning this job.
    fn spawn_execution(&self, job: Job) {
        let registry = self.registry.clone();
        let engine = self.engine.clone();
        let limiter = self.limiter.clone();
        let output_path = self.download_dir.join(format!(
            "{}.{}",
            job.id,
            job.format_spec.artifact_extension()
        ));

        tokio::spawn(async move {
            // The job stays visibly queued while waiting for a slot.
            let _permit = match limiter {
                Some(semaphore) => match semaphore.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    // Closed semaphore means the process is going down.
                    Err(_) => return,
                },
                None => None,
            };

            registry.start(&job.id);

            let request = FetchRequest {
                source_url: job.source_url.clone(),
                format_spec: job.format_spec,
                output_path,
            };

            let progress: ProgressFn = {
                let registry = registry.clone();
                let id = job.id.clone();
                Arc::new(move |pct| registry.update_progress(&id, pct))
            };

            // Run the engine in its own task so a panic is contained and
            // recorded instead of leaving the job running forever.
            let handle = tokio::spawn({
                let engine = engine.clone();
                let request = request.clone();
                async move { engine.fetch(&request, progress).await }
            });

            match handle.await {
                Ok(Ok(path)) => {
                    debug!(job_id = %job.id, path = %path.display(), "job completed");
                    registry.complete(&job.id, path);
                }
                Ok(Err(err)) => {
                    warn!(job_id = %job.id, error = %err, "job failed");
                    registry.fail(&job.id, &err.to_string());
                }
                Err(join_err) => {
                    warn!(job_id = %job.id, error = %join_err, "engine task panicked");
                    registry.fail(&job.id, &format!("engine task panicked: {}", join_err));
                }
            }
        });
    }
}
