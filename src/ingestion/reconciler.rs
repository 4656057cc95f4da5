use super::orchestrator::qualify_url;
use crate::artwork_store::{
    ArtworkStore, CatalogError, CatalogResult, NewArtwork, UploadJob, UploadJobStatus,
    UploadJobStore,
};
use crate::remote_storage::RemoteStorage;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Jobs whose remote processing had finished and now have an artwork.
    pub resumed: usize,
    /// Jobs given up on, with their remote file deleted.
    pub failed: usize,
    /// Jobs left for the next sweep because the storage service could not be asked.
    pub deferred: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settlement {
    Resumed,
    Failed,
    Deferred,
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Jobs created longer ago than this are no longer polled by any request.
    pub stale_after: Duration,
    /// Jobs this old are given up on even if the storage service cannot be reached.
    pub abandon_after: Duration,
}

/// Settles upload jobs abandoned by interrupted ingestions.
///
/// A stale job whose remote processing finished gets its artwork. One the storage service
/// reports as failed has its remote file deleted and is marked failed. Anything undecided,
/// including storage errors, waits for the next sweep until `abandon_after` has passed.
pub struct UploadReconciler {
    artworks: Arc<dyn ArtworkStore>,
    jobs: Arc<dyn UploadJobStore>,
    remote: Arc<dyn RemoteStorage>,
    public_base_url: String,
    config: ReconcilerConfig,
}

fn cutoff(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    let age = chrono::Duration::from_std(age).unwrap_or(chrono::Duration::MAX);
    now.checked_sub_signed(age)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl UploadReconciler {
    pub fn new(
        artworks: Arc<dyn ArtworkStore>,
        jobs: Arc<dyn UploadJobStore>,
        remote: Arc<dyn RemoteStorage>,
        public_base_url: String,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            artworks,
            jobs,
            remote,
            public_base_url,
            config,
        }
    }

    pub async fn reconcile_stale_jobs(&self) -> CatalogResult<ReconcileReport> {
        let now = Utc::now();
        let stale = self
            .jobs
            .list_stale_upload_jobs(cutoff(now, self.config.stale_after))?;
        if stale.is_empty() {
            debug!("No stale upload jobs");
            return Ok(ReconcileReport::default());
        }
        info!("Reconciling {} stale upload jobs", stale.len());

        let abandon_before = cutoff(now, self.config.abandon_after);
        let mut report = ReconcileReport::default();
        for job in stale {
            let expired = job.created_at < abandon_before;
            match self.settle(&job, expired).await? {
                Settlement::Resumed => report.resumed += 1,
                Settlement::Failed => report.failed += 1,
                Settlement::Deferred => report.deferred += 1,
            }
        }
        info!(
            "Reconciliation done: {} resumed, {} failed, {} deferred",
            report.resumed, report.failed, report.deferred
        );
        Ok(report)
    }

    async fn settle(&self, job: &UploadJob, expired: bool) -> CatalogResult<Settlement> {
        if job.status != UploadJobStatus::Completed {
            match self.remote.get_job_progress(&job.remote_job_id).await {
                Ok(progress) if progress.is_completed() => {}
                Ok(progress) if progress.is_failed() => {
                    info!("Remote job {} of upload {} failed", job.remote_job_id, job.id);
                    return self.give_up(job).await;
                }
                Ok(progress) => {
                    debug!(
                        "Remote job {} of upload {} still {}",
                        job.remote_job_id, job.id, progress.status
                    );
                    return self.defer_or_give_up(job, expired).await;
                }
                Err(err) => {
                    warn!(
                        "Could not check remote job {} of upload {}: {}",
                        job.remote_job_id, job.id, err
                    );
                    return self.defer_or_give_up(job, expired).await;
                }
            }
        }

        let info = match self.remote.get_file_info(&job.remote_file_id).await {
            Ok(info) => info,
            Err(err) => {
                warn!(
                    "Could not fetch remote file {} of upload {}: {}",
                    job.remote_file_id, job.id, err
                );
                return self.defer_or_give_up(job, expired).await;
            }
        };
        let new_artwork = NewArtwork {
            file_id: job.remote_file_id.clone(),
            url: qualify_url(&self.public_base_url, &info.access_url),
            thumbnail_url: info
                .thumbnail_url()
                .map(|path| qualify_url(&self.public_base_url, path))
                .unwrap_or_default(),
            content_digest: job.content_digest.clone(),
            perceptual_digest: job.perceptual_digest,
            tags: Vec::new(),
        };
        match self.jobs.complete_upload_job(job.id, &new_artwork) {
            Ok(artwork) => {
                info!("Recovered artwork {} from upload job {}", artwork.id, job.id);
                Ok(Settlement::Resumed)
            }
            Err(CatalogError::DuplicateContent(_)) => {
                let existing = self.artworks.find_by_content_digest(&job.content_digest)?;
                match existing {
                    Some(artwork) if artwork.file_id == job.remote_file_id => {
                        info!(
                            "Upload job {} was already catalogued as artwork {}",
                            job.id, artwork.id
                        );
                        self.jobs.delete_upload_job(job.id)?;
                        Ok(Settlement::Resumed)
                    }
                    _ => {
                        info!(
                            "Upload job {} duplicates an existing artwork, discarding",
                            job.id
                        );
                        self.give_up(job).await
                    }
                }
            }
            Err(err) => Err(err),
        }
    }

    async fn defer_or_give_up(&self, job: &UploadJob, expired: bool) -> CatalogResult<Settlement> {
        if expired {
            warn!("Upload job {} is past its deadline, giving up", job.id);
            return self.give_up(job).await;
        }
        Ok(Settlement::Deferred)
    }

    async fn give_up(&self, job: &UploadJob) -> CatalogResult<Settlement> {
        if let Err(err) = self.remote.delete(&job.remote_file_id).await {
            warn!(
                "Failed to delete remote file {} of upload job {}: {}",
                job.remote_file_id, job.id, err
            );
        }
        self.jobs.record_upload_job_check(
            job.id,
            UploadJobStatus::Failed,
            job.attempts,
            Some("abandoned, resolved by reconciliation"),
        )?;
        Ok(Settlement::Failed)
    }
}
