//! Gallery Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod artwork_store;
pub mod auth;
pub mod config;
pub mod fingerprint;
pub mod ingestion;
pub mod remote_storage;
pub mod server;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use artwork_store::{ArtworkStore, SqliteArtworkStore, UploadJobStore};
pub use auth::ApiKeyPolicy;
pub use ingestion::{IngestionOrchestrator, UploadJobPoller, UploadReconciler};
pub use remote_storage::{HttpRemoteStorage, RemoteStorage};
pub use server::{make_app, run_server, RequestsLoggingLevel};
