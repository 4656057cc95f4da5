use axum::extract::FromRef;

use crate::artwork_store::ArtworkStore;
use crate::auth::ApiKeyPolicy;
use crate::ingestion::IngestionOrchestrator;
use crate::remote_storage::RemoteStorage;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use super::ServerConfig;

pub type GuardedArtworkStore = Arc<dyn ArtworkStore>;
pub type GuardedRemoteStorage = Arc<dyn RemoteStorage>;
pub type GuardedOrchestrator = Arc<IngestionOrchestrator>;
pub type GuardedApiKeyPolicy = Arc<ApiKeyPolicy>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub hash: String,
    pub artwork_store: GuardedArtworkStore,
    pub remote_storage: GuardedRemoteStorage,
    pub orchestrator: GuardedOrchestrator,
    pub api_key_policy: GuardedApiKeyPolicy,
    /// Cancelled on shutdown; every ingestion runs under a child of it.
    pub shutdown: CancellationToken,
}

impl FromRef<ServerState> for GuardedArtworkStore {
    fn from_ref(input: &ServerState) -> Self {
        input.artwork_store.clone()
    }
}

impl FromRef<ServerState> for GuardedRemoteStorage {
    fn from_ref(input: &ServerState) -> Self {
        input.remote_storage.clone()
    }
}

impl FromRef<ServerState> for GuardedOrchestrator {
    fn from_ref(input: &ServerState) -> Self {
        input.orchestrator.clone()
    }
}

impl FromRef<ServerState> for GuardedApiKeyPolicy {
    fn from_ref(input: &ServerState) -> Self {
        input.api_key_policy.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
