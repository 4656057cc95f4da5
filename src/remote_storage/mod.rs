//! Client side of the external file-hosting service images are delegated to.

mod client;
mod models;
#[cfg(test)]
pub(crate) mod testing;

pub use client::{HttpRemoteStorage, RemoteStorageConfig};
pub use models::*;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum RemoteStorageError {
    #[error("request to storage service timed out")]
    Timeout,

    #[error("storage service unreachable: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("storage service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("storage service rejected the request (code {code}): {message}")]
    Business { code: i64, message: String },

    #[error("malformed storage service response: {0}")]
    MalformedEnvelope(String),
}

impl From<reqwest::Error> for RemoteStorageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteStorageError::Timeout
        } else if err.is_decode() {
            RemoteStorageError::MalformedEnvelope(err.to_string())
        } else {
            RemoteStorageError::Transport(err)
        }
    }
}

/// File handed to the storage service.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Operations offered by the storage service. Every call is a single bounded request.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Hands the bytes over. Returns as soon as the service acknowledged the file,
    /// before variants are generated.
    async fn upload(
        &self,
        file: UploadFile,
        options: &UploadOptions,
    ) -> Result<UploadReceipt, RemoteStorageError>;

    async fn delete(&self, file_id: &str) -> Result<DeleteOutcome, RemoteStorageError>;

    async fn get_file_info(&self, file_id: &str) -> Result<FileInfo, RemoteStorageError>;

    async fn get_job_progress(&self, job_id: &str) -> Result<JobProgress, RemoteStorageError>;
}
