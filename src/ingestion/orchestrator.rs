use super::{DigestLocks, DuplicateDetector, IngestionError, PollError, UploadJobPoller};
use crate::artwork_store::{
    Artwork, ArtworkStore, CatalogError, NewArtwork, NewUploadJob, UploadJob, UploadJobStatus,
    UploadJobStore,
};
use crate::fingerprint::{content_digest, perceptual_digest};
use crate::remote_storage::{RemoteStorage, UploadFile, UploadOptions};
use crate::server::metrics::record_ingestion_outcome;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// File extensions accepted for upload, lowercase.
pub const ACCEPTED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub similarity_threshold: u32,
    /// Prefix for the relative paths returned by the storage service.
    pub public_base_url: String,
    pub upload_options: UploadOptions,
}

#[derive(Debug, Clone)]
pub struct IncomingUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Turns an uploaded image into a catalogued artwork.
///
/// The pipeline is: validate, fingerprint, reject exact and near duplicates, hand the bytes
/// to the storage service, wait for its processing job, then persist the catalog record.
/// Ingestions of identical bytes are serialized from the exact-duplicate check onward. Any
/// failure after the remote upload deletes the remote file again, except cancellation,
/// which leaves the job row for the reconciler.
pub struct IngestionOrchestrator {
    detector: DuplicateDetector,
    artworks: Arc<dyn ArtworkStore>,
    jobs: Arc<dyn UploadJobStore>,
    remote: Arc<dyn RemoteStorage>,
    poller: UploadJobPoller,
    locks: DigestLocks,
    config: OrchestratorConfig,
}

impl IngestionOrchestrator {
    pub fn new(
        artworks: Arc<dyn ArtworkStore>,
        jobs: Arc<dyn UploadJobStore>,
        remote: Arc<dyn RemoteStorage>,
        poller: UploadJobPoller,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            detector: DuplicateDetector::new(artworks.clone()),
            artworks,
            jobs,
            remote,
            poller,
            locks: DigestLocks::new(),
            config,
        }
    }

    pub async fn ingest(
        &self,
        upload: IncomingUpload,
        cancel: &CancellationToken,
    ) -> Result<Artwork, IngestionError> {
        let result = self.run(upload, cancel).await;
        match &result {
            Ok(artwork) => {
                record_ingestion_outcome("created");
                info!("Ingested artwork {} ({})", artwork.id, artwork.file_id);
            }
            Err(err) => {
                record_ingestion_outcome(err.outcome());
                info!("Ingestion ended without a new artwork: {}", err);
            }
        }
        result
    }

    async fn run(
        &self,
        upload: IncomingUpload,
        cancel: &CancellationToken,
    ) -> Result<Artwork, IngestionError> {
        validate_upload(&upload)?;
        let IncomingUpload { file_name, bytes } = upload;
        let bytes = Arc::new(bytes);

        let digest = {
            let bytes = bytes.clone();
            blocking(cancel, move || content_digest(Cursor::new(bytes.as_slice())))
                .await?
                .map_err(|e| IngestionError::Internal(format!("failed to hash upload: {}", e)))?
        };

        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(IngestionError::Cancelled),
            guard = self.locks.acquire(&digest) => guard,
        };

        let exact = {
            let detector = self.detector.clone();
            let digest = digest.clone();
            blocking(cancel, move || detector.check_exact_duplicate(&digest)).await??
        };
        if let Some(existing) = exact {
            info!("Upload {} is an exact copy of artwork {}", file_name, existing.id);
            return Err(IngestionError::Duplicate {
                existing_id: existing.id,
                distance: None,
            });
        }

        let perceptual = {
            let bytes = bytes.clone();
            blocking(cancel, move || perceptual_digest(Cursor::new(bytes.as_slice()))).await?
        };
        let perceptual = match perceptual {
            Ok(0) => None,
            Ok(value) => Some(value),
            Err(err) => {
                warn!(
                    "Skipping similarity check for {}, perceptual digest unavailable: {}",
                    file_name, err
                );
                None
            }
        };

        if let Some(value) = perceptual {
            let detector = self.detector.clone();
            let threshold = self.config.similarity_threshold;
            let similar =
                blocking(cancel, move || detector.check_similar(value, threshold)).await??;
            if let Some(closest) = similar.into_iter().next() {
                info!(
                    "Upload {} is {} bits away from artwork {}",
                    file_name, closest.distance, closest.artwork.id
                );
                return Err(IngestionError::Duplicate {
                    existing_id: closest.artwork.id,
                    distance: Some(closest.distance),
                });
            }
        }

        let file = UploadFile {
            name: file_name.clone(),
            content_type: infer::get(&bytes).map(|kind| kind.mime_type().to_string()),
            bytes: Arc::unwrap_or_clone(bytes),
        };
        let receipt = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(IngestionError::Cancelled),
            receipt = self.remote.upload(file, &self.config.upload_options) => {
                receipt.map_err(IngestionError::RemoteUnavailable)?
            }
        };
        info!(
            "Storage accepted {} as file {}, job {}",
            file_name, receipt.file_id, receipt.job_id
        );

        let created = {
            let jobs = self.jobs.clone();
            let new_job = NewUploadJob {
                content_digest: digest.clone(),
                perceptual_digest: perceptual,
                file_name,
                remote_file_id: receipt.file_id.clone(),
                remote_job_id: receipt.job_id.clone(),
                status_url: receipt.status_url.clone(),
            };
            blocking(cancel, move || jobs.create_upload_job(&new_job)).await
        };
        let mut job = match created {
            Ok(Ok(job)) => job,
            // The insert still runs to completion, the reconciler settles the row
            Err(IngestionError::Cancelled) => return Err(IngestionError::Cancelled),
            Ok(Err(err)) => {
                self.discard_remote_file(&receipt.file_id).await;
                return Err(err.into());
            }
            Err(err) => {
                self.discard_remote_file(&receipt.file_id).await;
                return Err(err);
            }
        };

        match self.poller.poll(&mut job, cancel).await {
            Ok(_) => {}
            Err(PollError::Cancelled) => {
                warn!(
                    "Ingestion of file {} cancelled while polling, job {} left for reconciliation",
                    job.remote_file_id, job.id
                );
                return Err(IngestionError::Cancelled);
            }
            Err(err) => {
                self.discard_remote_file(&job.remote_file_id).await;
                return Err(match err {
                    PollError::TimedOut { job_id, attempts } => {
                        IngestionError::PollTimeout { job_id, attempts }
                    }
                    PollError::JobFailed { job_id, message } => {
                        IngestionError::RemoteJobFailed { job_id, message }
                    }
                    PollError::Remote(err) => IngestionError::RemoteUnavailable(err),
                    PollError::Cancelled => IngestionError::Cancelled,
                });
            }
        }

        let info = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(IngestionError::Cancelled),
            info = self.remote.get_file_info(&job.remote_file_id) => info,
        };
        let info = match info {
            Ok(info) => info,
            Err(err) => {
                self.fail_job(&job, &err.to_string(), cancel).await;
                self.discard_remote_file(&job.remote_file_id).await;
                return Err(IngestionError::RemoteUnavailable(err));
            }
        };

        let base = &self.config.public_base_url;
        let new_artwork = NewArtwork {
            file_id: job.remote_file_id.clone(),
            url: qualify_url(base, &info.access_url),
            thumbnail_url: info
                .thumbnail_url()
                .map(|path| qualify_url(base, path))
                .unwrap_or_default(),
            content_digest: digest.clone(),
            perceptual_digest: perceptual,
            tags: Vec::new(),
        };

        // Artwork insert and job removal commit together, so a cancelled request either
        // catalogued the file or left the job for the reconciler
        let completed = {
            let jobs = self.jobs.clone();
            let job_id = job.id;
            blocking(cancel, move || jobs.complete_upload_job(job_id, &new_artwork)).await?
        };
        match completed {
            Ok(artwork) => Ok(artwork),
            Err(CatalogError::DuplicateContent(_)) => {
                self.fail_job(&job, "content catalogued by a concurrent upload", cancel)
                    .await;
                self.discard_remote_file(&job.remote_file_id).await;
                let existing = {
                    let artworks = self.artworks.clone();
                    let digest = digest.clone();
                    blocking(cancel, move || artworks.find_by_content_digest(&digest)).await??
                };
                let existing_id = existing.map(|artwork| artwork.id).ok_or_else(|| {
                    IngestionError::Internal(format!(
                        "digest {} conflicted but no live artwork carries it",
                        digest
                    ))
                })?;
                Err(IngestionError::Duplicate {
                    existing_id,
                    distance: None,
                })
            }
            Err(err) => {
                self.fail_job(&job, &err.to_string(), cancel).await;
                self.discard_remote_file(&job.remote_file_id).await;
                Err(err.into())
            }
        }
    }

    /// Best-effort removal of a file the catalog will never reference.
    async fn discard_remote_file(&self, file_id: &str) {
        match self.remote.delete(file_id).await {
            Ok(outcome) => info!("Discarded remote file {} ({:?})", file_id, outcome),
            Err(err) => warn!("Failed to discard remote file {}: {}", file_id, err),
        }
    }

    async fn fail_job(&self, job: &UploadJob, message: &str, cancel: &CancellationToken) {
        let jobs = self.jobs.clone();
        let (id, attempts, message) = (job.id, job.attempts, message.to_string());
        let marked = blocking(cancel, move || {
            jobs.record_upload_job_check(id, UploadJobStatus::Failed, attempts, Some(&message))
        })
        .await
        .and_then(|result| result.map_err(IngestionError::from));
        if let Err(err) = marked {
            warn!("Failed to mark upload job {} as failed: {}", job.id, err);
        }
    }
}

fn validate_upload(upload: &IncomingUpload) -> Result<(), IngestionError> {
    if upload.file_name.trim().is_empty() {
        return Err(IngestionError::BadInput("missing file name".to_string()));
    }
    if upload.bytes.is_empty() {
        return Err(IngestionError::BadInput("file is empty".to_string()));
    }
    let extension = Path::new(&upload.file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension {
        Some(ext) if ACCEPTED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(IngestionError::BadInput(format!(
            "unsupported file type, accepted: {}",
            ACCEPTED_EXTENSIONS.join(", ")
        ))),
    }
}

/// Joins a storage-relative path onto the public base URL. Absolute URLs pass through.
pub(crate) fn qualify_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Runs CPU or database work off the async workers, giving up early on cancellation.
async fn blocking<T, F>(cancel: &CancellationToken, work: F) -> Result<T, IngestionError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let task = tokio::task::spawn_blocking(work);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(IngestionError::Cancelled),
        joined = task => joined
            .map_err(|e| IngestionError::Internal(format!("blocking task failed: {}", e))),
    }
}
