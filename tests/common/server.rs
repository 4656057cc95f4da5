//! Test server lifecycle management
//!
//! Each test gets an isolated gallery server with its own database, backed by its
//! own fake storage service.

use super::constants::*;
use super::fake_storage::FakeStorageService;
use gallery_server::artwork_store::SqliteArtworkStore;
use gallery_server::auth::ApiKeyPolicy;
use gallery_server::ingestion::{
    IngestionOrchestrator, OrchestratorConfig, PollerConfig, UploadJobPoller,
    DEFAULT_SIMILARITY_THRESHOLD,
};
use gallery_server::remote_storage::{
    HttpRemoteStorage, RemoteStorage, RemoteStorageConfig, UploadOptions,
};
use gallery_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Test server instance with an isolated database
///
/// When dropped, the server gracefully shuts down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// Storage service the server delegates files to
    pub storage: FakeStorageService,

    /// Store for direct database access in tests
    #[allow(dead_code)]
    pub store: Arc<SqliteArtworkStore>,

    // Private fields - keep resources alive until drop
    _temp_db_dir: TempDir,
    shutdown: CancellationToken,
}

impl TestServer {
    /// Spawns a new test server on a random port
    ///
    /// # Panics
    ///
    /// Panics if the database cannot be created, a port cannot be bound, or the
    /// server doesn't become ready within timeout.
    pub async fn spawn() -> Self {
        let storage = FakeStorageService::spawn().await;

        let temp_db_dir = TempDir::new().expect("Failed to create temp db dir");
        let store = Arc::new(
            SqliteArtworkStore::new(temp_db_dir.path().join("gallery.db"))
                .expect("Failed to open gallery store"),
        );

        let remote_storage: Arc<dyn RemoteStorage> = Arc::new(
            HttpRemoteStorage::new(&RemoteStorageConfig {
                base_url: storage.base_url.clone(),
                app_id: STORAGE_APP_ID.to_string(),
                space_id: "e2e".to_string(),
                api_key: STORAGE_API_KEY.to_string(),
                timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            })
            .expect("Failed to create storage client"),
        );

        let poller = UploadJobPoller::new(
            remote_storage.clone(),
            store.clone(),
            PollerConfig {
                max_attempts: 20,
                interval: Duration::from_millis(POLL_INTERVAL_MS),
            },
        );
        let orchestrator = Arc::new(IngestionOrchestrator::new(
            store.clone(),
            store.clone(),
            remote_storage.clone(),
            poller,
            OrchestratorConfig {
                similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
                public_base_url: storage.base_url.clone(),
                upload_options: UploadOptions::default(),
            },
        ));

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
            ..ServerConfig::default()
        };

        let shutdown = CancellationToken::new();
        let app = make_app(
            config,
            store.clone(),
            remote_storage,
            orchestrator,
            Arc::new(ApiKeyPolicy::from_keys([TEST_API_KEY])),
            shutdown.clone(),
        )
        .expect("Failed to build app");

        // Spawn server in background task with graceful shutdown
        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await
            .expect("Server failed");
        });

        let server = Self {
            base_url,
            storage,
            store,
            _temp_db_dir: temp_db_dir,
            shutdown,
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the home endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
        // TempDir will be cleaned up automatically
    }
}
