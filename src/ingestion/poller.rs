use crate::artwork_store::{UploadJob, UploadJobStatus, UploadJobStore};
use crate::remote_storage::{JobProgress, RemoteStorage, RemoteStorageError};
use crate::server::metrics::record_poll_attempts;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            interval: Duration::from_secs(1),
        }
    }
}

impl PollerConfig {
    /// Upper bound on how long a single poll can keep a job busy.
    pub fn max_duration(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("polling cancelled")]
    Cancelled,

    #[error("remote job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("job progress request failed: {0}")]
    Remote(#[from] RemoteStorageError),

    #[error("remote job {job_id} did not complete after {attempts} polls")]
    TimedOut { job_id: String, attempts: u32 },
}

/// Drives an upload job to a terminal state by polling the storage service.
///
/// Every check is written to the job store so an interrupted poll can be reconciled later.
/// Cancellation is observed before each request, during the request and during the sleep.
pub struct UploadJobPoller {
    remote: Arc<dyn RemoteStorage>,
    jobs: Arc<dyn UploadJobStore>,
    config: PollerConfig,
}

impl UploadJobPoller {
    pub fn new(
        remote: Arc<dyn RemoteStorage>,
        jobs: Arc<dyn UploadJobStore>,
        config: PollerConfig,
    ) -> Self {
        Self {
            remote,
            jobs,
            config,
        }
    }

    pub async fn poll(
        &self,
        job: &mut UploadJob,
        cancel: &CancellationToken,
    ) -> Result<JobProgress, PollError> {
        let result = self.poll_loop(job, cancel).await;
        record_poll_attempts(job.attempts);
        result
    }

    async fn poll_loop(
        &self,
        job: &mut UploadJob,
        cancel: &CancellationToken,
    ) -> Result<JobProgress, PollError> {
        for attempt in 1..=self.config.max_attempts {
            if cancel.is_cancelled() {
                return Err(PollError::Cancelled);
            }

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PollError::Cancelled),
                response = self.remote.get_job_progress(&job.remote_job_id) => response,
            };

            match response {
                Ok(progress) if progress.is_completed() => {
                    self.record(job, UploadJobStatus::Completed, attempt, None);
                    info!(
                        "Remote job {} completed after {} polls",
                        job.remote_job_id, attempt
                    );
                    return Ok(progress);
                }
                Ok(progress) if progress.is_failed() => {
                    let message = progress
                        .error_msg
                        .unwrap_or_else(|| "no error message".to_string());
                    self.record(job, UploadJobStatus::Failed, attempt, Some(&message));
                    return Err(PollError::JobFailed {
                        job_id: job.remote_job_id.clone(),
                        message,
                    });
                }
                Ok(progress) => {
                    debug!(
                        "Remote job {} is {} ({}/{} tasks), poll {}/{}",
                        job.remote_job_id,
                        progress.status,
                        progress.completed_tasks,
                        progress.total_tasks,
                        attempt,
                        self.config.max_attempts
                    );
                    self.record(job, UploadJobStatus::Processing, attempt, None);
                }
                Err(err) => {
                    self.record(job, UploadJobStatus::Failed, attempt, Some(&err.to_string()));
                    return Err(PollError::Remote(err));
                }
            }

            if attempt < self.config.max_attempts {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(PollError::Cancelled),
                    _ = tokio::time::sleep(self.config.interval) => {}
                }
            }
        }

        let attempts = self.config.max_attempts;
        self.record(
            job,
            UploadJobStatus::Failed,
            attempts,
            Some("timed out waiting for remote processing"),
        );
        Err(PollError::TimedOut {
            job_id: job.remote_job_id.clone(),
            attempts,
        })
    }

    fn record(&self, job: &mut UploadJob, status: UploadJobStatus, attempts: u32, error: Option<&str>) {
        job.status = status;
        job.attempts = attempts;
        job.error = error.map(|e| e.to_string());
        job.last_checked_at = Some(Utc::now());
        if let Err(err) = self
            .jobs
            .record_upload_job_check(job.id, status, attempts, error)
        {
            warn!("Failed to persist state of upload job {}: {}", job.id, err);
        }
    }
}
