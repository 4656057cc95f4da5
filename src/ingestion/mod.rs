mod digest_lock;
mod duplicate_detector;
mod errors;
mod orchestrator;
mod poller;
mod reconciler;

pub use digest_lock::{DigestGuard, DigestLocks};
pub use duplicate_detector::{DuplicateDetector, SimilarArtwork, DEFAULT_SIMILARITY_THRESHOLD};
pub use errors::IngestionError;
pub use orchestrator::{
    IncomingUpload, IngestionOrchestrator, OrchestratorConfig, ACCEPTED_EXTENSIONS,
};
pub use poller::{PollError, PollerConfig, UploadJobPoller};
pub use reconciler::{ReconcileReport, ReconcilerConfig, UploadReconciler};
