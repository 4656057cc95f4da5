use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{extract::State, middleware, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tracing::{error, info};

use super::artwork_routes::make_artwork_routes;
use super::metrics::metrics_handler;
use super::upload_routes::make_upload_routes;
use super::{assign_request_id, log_requests, state::*, ServerConfig};
use crate::artwork_store::ArtworkStore;
use crate::auth::ApiKeyPolicy;
use crate::ingestion::IngestionOrchestrator;
use crate::remote_storage::RemoteStorage;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
    };
    Json(stats)
}

pub fn make_app(
    config: ServerConfig,
    artwork_store: Arc<dyn ArtworkStore>,
    remote_storage: Arc<dyn RemoteStorage>,
    orchestrator: Arc<IngestionOrchestrator>,
    api_key_policy: Arc<ApiKeyPolicy>,
    shutdown: CancellationToken,
) -> Result<Router> {
    let state = ServerState {
        config: config.clone(),
        start_time: Instant::now(),
        hash: env!("GIT_HASH").to_string(),
        artwork_store,
        remote_storage,
        orchestrator,
        api_key_policy,
        shutdown,
    };

    let artwork_routes: Router = make_artwork_routes(state.clone()).merge(make_upload_routes(state.clone()));

    let home_router: Router = match config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new()
            .route("/", get(home))
            .with_state(state.clone()),
    };

    let app: Router = home_router
        .nest("/api/v1/artworks", artwork_routes)
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .layer(middleware::from_fn(assign_request_id));

    Ok(app)
}

fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Serves the API until `shutdown` is cancelled, plus the metrics endpoint on its own port.
pub async fn run_server(
    config: ServerConfig,
    artwork_store: Arc<dyn ArtworkStore>,
    remote_storage: Arc<dyn RemoteStorage>,
    orchestrator: Arc<IngestionOrchestrator>,
    api_key_policy: Arc<ApiKeyPolicy>,
    shutdown: CancellationToken,
) -> Result<()> {
    let port = config.port;
    let metrics_port = config.metrics_port;
    let app = make_app(
        config,
        artwork_store,
        remote_storage,
        orchestrator,
        api_key_policy,
        shutdown.clone(),
    )?;

    let metrics_listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", metrics_port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", metrics_port))?;
    let metrics_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let served = axum::serve(metrics_listener, make_metrics_app())
            .with_graceful_shutdown(async move { metrics_shutdown.cancelled().await })
            .await;
        if let Err(err) = served {
            error!("Metrics server failed: {}", err);
        }
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Ready to serve at port {}!", port);
    info!("Metrics available at port {}!", metrics_port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;

    info!("Server stopped");
    Ok(())
}
