use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::{fmt::Debug, path::PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gallery_server::artwork_store::{ArtworkStore, SqliteArtworkStore};
use gallery_server::auth::ApiKeyPolicy;
use gallery_server::config::{AppConfig, CliConfig, FileConfig};
use gallery_server::ingestion::{IngestionOrchestrator, UploadJobPoller, UploadReconciler};
use gallery_server::remote_storage::{HttpRemoteStorage, RemoteStorage};
use gallery_server::server::{metrics, run_server, RequestsLoggingLevel};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Values in it override the CLI flags.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding the gallery database and the API key file.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 9000)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,

    /// File with one accepted API key per line. Generated when missing.
    #[clap(long, value_parser = parse_path)]
    pub api_key_file: Option<PathBuf>,

    /// Base URL of the file storage service.
    #[clap(long)]
    pub storage_base_url: Option<String>,

    /// Application id sent to the storage service.
    #[clap(long)]
    pub storage_app_id: Option<String>,

    /// Space the images are stored in.
    #[clap(long)]
    pub storage_space_id: Option<String>,

    /// Credential for the storage service.
    #[clap(long)]
    pub storage_api_key: Option<String>,

    /// Timeout in seconds for storage service requests.
    #[clap(long, default_value_t = 30)]
    pub storage_timeout_sec: u64,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: self.db_dir.clone(),
            port: self.port,
            metrics_port: self.metrics_port,
            logging_level: self.logging_level.clone(),
            frontend_dir_path: self.frontend_dir_path.clone(),
            api_key_file: self.api_key_file.clone(),
            storage_base_url: self.storage_base_url.clone(),
            storage_app_id: self.storage_app_id.clone(),
            storage_space_id: self.storage_space_id.clone(),
            storage_api_key: self.storage_api_key.clone(),
            storage_timeout_sec: self.storage_timeout_sec,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    // Initialize metrics system
    info!("Initializing metrics...");
    metrics::init_metrics();

    let store = Arc::new(SqliteArtworkStore::new(config.gallery_db_path())?);
    metrics::set_artworks_total(store.count_artworks()?);

    info!(
        "Storage service configured at {}",
        config.storage.base_url
    );
    let remote_storage: Arc<dyn RemoteStorage> =
        Arc::new(HttpRemoteStorage::new(&config.remote_storage_config())?);

    let api_key_policy = Arc::new(ApiKeyPolicy::load_or_generate(&config.api_key_file)?);
    info!(
        "Loaded {} API key(s) from {:?}",
        api_key_policy.key_count(),
        config.api_key_file
    );

    let poller = UploadJobPoller::new(
        remote_storage.clone(),
        store.clone(),
        config.poller_config(),
    );
    let orchestrator = Arc::new(IngestionOrchestrator::new(
        store.clone(),
        store.clone(),
        remote_storage.clone(),
        poller,
        config.orchestrator_config(),
    ));

    let shutdown = CancellationToken::new();

    // Upload jobs left behind by a previous run are settled once now, then periodically
    let reconciler = UploadReconciler::new(
        store.clone(),
        store.clone(),
        remote_storage.clone(),
        config.storage.public_base_url.clone(),
        config.reconciler_config(),
    );
    run_reconciliation(&reconciler).await;
    let reconcile_interval = config.reconcile_interval();
    let reconcile_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(reconcile_interval);

        // Skip the first immediate tick, wait for the first interval
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = reconcile_shutdown.cancelled() => break,
                _ = ticker.tick() => run_reconciliation(&reconciler).await,
            }
        }
    });

    spawn_api_key_reloader(api_key_policy.clone(), shutdown.clone());
    spawn_shutdown_listener(shutdown.clone());

    run_server(
        config.server_config(),
        store,
        remote_storage,
        orchestrator,
        api_key_policy,
        shutdown,
    )
    .await
}

async fn run_reconciliation(reconciler: &UploadReconciler) {
    match reconciler.reconcile_stale_jobs().await {
        Ok(report) => {
            metrics::record_reconciled_jobs(report.resumed, report.failed);
            if report.resumed > 0 || report.failed > 0 || report.deferred > 0 {
                info!(
                    "Reconciled stale upload jobs: {} resumed, {} failed, {} deferred",
                    report.resumed, report.failed, report.deferred
                );
            }
        }
        Err(e) => {
            error!("Failed to reconcile stale upload jobs: {}", e);
        }
    }
}

#[cfg(unix)]
fn spawn_api_key_reloader(policy: Arc<ApiKeyPolicy>, shutdown: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = match signal(SignalKind::hangup()) {
        Ok(hangups) => hangups,
        Err(e) => {
            warn!("Cannot listen for SIGHUP, API keys will not be reloaded: {}", e);
            return;
        }
    };
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                received = hangups.recv() => {
                    if received.is_none() {
                        break;
                    }
                    match policy.reload() {
                        Ok(count) => info!("Reloaded {} API key(s)", count),
                        Err(e) => error!("Failed to reload API keys, keeping current ones: {:#}", e),
                    }
                }
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_api_key_reloader(_policy: Arc<ApiKeyPolicy>, _shutdown: CancellationToken) {}

fn spawn_shutdown_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!("Cannot listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
        }
        info!("Shutdown requested, finishing in-flight requests...");
        shutdown.cancel();
    });
}
