mod models;
mod schema;
mod sqlite_artwork_store;

pub use models::*;
pub use schema::GALLERY_VERSIONED_SCHEMAS;
pub use sqlite_artwork_store::SqliteArtworkStore;

use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Another live artwork already carries this content digest.
    #[error("content digest {0} is already catalogued")]
    DuplicateContent(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("stored data is corrupted: {0}")]
    Corrupted(String),
}

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Persistent catalog of artworks. Soft-deleted records are invisible to every method.
pub trait ArtworkStore: Send + Sync {
    /// Inserts a new artwork. Fails with [`CatalogError::DuplicateContent`] when the digest
    /// is already used by a live record.
    fn create_artwork(&self, artwork: &NewArtwork) -> CatalogResult<Artwork>;
    fn get_artwork(&self, id: i64) -> CatalogResult<Option<Artwork>>;
    fn find_by_content_digest(&self, digest: &str) -> CatalogResult<Option<Artwork>>;

    /// All (id, perceptual digest) pairs with a computed digest, ordered by id.
    fn list_perceptual_digests(&self) -> CatalogResult<Vec<(i64, u64)>>;

    fn list_artworks(&self, query: &ArtworkQuery) -> CatalogResult<ArtworkPage>;
    fn random_artworks(&self, limit: usize) -> CatalogResult<Vec<Artwork>>;
    fn count_artworks(&self) -> CatalogResult<usize>;

    /// Returns `None` if the artwork does not exist.
    fn increment_counter(
        &self,
        id: i64,
        counter: EngagementCounter,
    ) -> CatalogResult<Option<EngagementCounts>>;
    /// Like `increment_counter`, never going below zero.
    fn decrement_counter(
        &self,
        id: i64,
        counter: EngagementCounter,
    ) -> CatalogResult<Option<EngagementCounts>>;

    fn update_artwork(&self, id: i64, update: &ArtworkUpdate) -> CatalogResult<Option<Artwork>>;
    /// Returns false if there was nothing to delete.
    fn soft_delete_artwork(&self, id: i64) -> CatalogResult<bool>;
}

/// Durable tracking of delegated uploads.
pub trait UploadJobStore: Send + Sync {
    fn create_upload_job(&self, job: &NewUploadJob) -> CatalogResult<UploadJob>;
    fn get_upload_job(&self, id: i64) -> CatalogResult<Option<UploadJob>>;
    fn record_upload_job_check(
        &self,
        id: i64,
        status: UploadJobStatus,
        attempts: u32,
        error: Option<&str>,
    ) -> CatalogResult<()>;
    /// Inserts the artwork and drops the job row in one transaction. Fails like
    /// [`ArtworkStore::create_artwork`], leaving the job untouched.
    fn complete_upload_job(&self, id: i64, artwork: &NewArtwork) -> CatalogResult<Artwork>;
    fn delete_upload_job(&self, id: i64) -> CatalogResult<()>;
    /// Jobs not marked failed that were created before `cutoff`, oldest first.
    fn list_stale_upload_jobs(&self, cutoff: DateTime<Utc>) -> CatalogResult<Vec<UploadJob>>;
}
