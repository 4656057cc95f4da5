use crate::artwork_store::CatalogError;
use crate::remote_storage::RemoteStorageError;

/// How an ingestion ended when it did not produce an artwork.
#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    #[error("invalid upload: {0}")]
    BadInput(String),

    /// The content is already catalogued. `distance` is set for near-duplicates.
    #[error("content already catalogued as artwork {existing_id}")]
    Duplicate {
        existing_id: i64,
        distance: Option<u32>,
    },

    #[error("storage service unavailable: {0}")]
    RemoteUnavailable(#[source] RemoteStorageError),

    #[error("remote job {job_id} did not complete after {attempts} polls")]
    PollTimeout { job_id: String, attempts: u32 },

    #[error("remote job {job_id} failed: {message}")]
    RemoteJobFailed { job_id: String, message: String },

    #[error("ingestion cancelled")]
    Cancelled,

    #[error("catalog failure: {0}")]
    Catalog(#[from] CatalogError),

    #[error("internal failure: {0}")]
    Internal(String),
}

impl IngestionError {
    /// Short label used for metrics and logs.
    pub fn outcome(&self) -> &'static str {
        match self {
            IngestionError::BadInput(_) => "bad_input",
            IngestionError::Duplicate { distance: None, .. } => "duplicate",
            IngestionError::Duplicate { .. } => "near_duplicate",
            IngestionError::RemoteUnavailable(_) => "remote_unavailable",
            IngestionError::PollTimeout { .. } => "poll_timeout",
            IngestionError::RemoteJobFailed { .. } => "remote_job_failed",
            IngestionError::Cancelled => "cancelled",
            IngestionError::Catalog(_) | IngestionError::Internal(_) => "internal",
        }
    }
}
