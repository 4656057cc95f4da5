//! Image upload route.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use tracing::{info_span, warn, Instrument};

use super::error_response::ApiError;
use super::metrics::record_artwork_created;
use super::state::ServerState;
use super::RequestId;
use crate::ingestion::IncomingUpload;

/// Multipart field holding the image.
const FILE_FIELD: &str = "file";

/// POST /upload - multipart/form-data with a single `file` part
async fn upload_artwork(
    State(state): State<ServerState>,
    request_id: RequestId,
    mut multipart: Multipart,
) -> Response {
    let mut upload: Option<IncomingUpload> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                warn!("Failed to read multipart body: {}", err);
                return ApiError::new(err.status(), err.body_text(), &request_id).into_response();
            }
        };
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        match field.bytes().await {
            Ok(bytes) => {
                upload = Some(IncomingUpload {
                    file_name,
                    bytes: bytes.to_vec(),
                })
            }
            Err(err) => {
                warn!("Failed to read file data: {}", err);
                return ApiError::new(err.status(), err.body_text(), &request_id).into_response();
            }
        }
    }

    let Some(upload) = upload else {
        return ApiError::bad_request("missing multipart field 'file'", &request_id)
            .into_response();
    };

    let cancel = state.shutdown.child_token();
    // Dropping the request (client gone) cancels the ingestion too.
    let _cancel_on_drop = cancel.clone().drop_guard();

    let span = info_span!("ingest", file = %upload.file_name, size = upload.bytes.len());
    match state
        .orchestrator
        .ingest(upload, &cancel)
        .instrument(span)
        .await
    {
        Ok(artwork) => {
            record_artwork_created();
            (StatusCode::CREATED, Json(artwork)).into_response()
        }
        Err(err) => ApiError::from_ingestion(err, &request_id).into_response(),
    }
}

pub fn make_upload_routes(state: ServerState) -> Router {
    let max_upload_bytes = state.config.max_upload_bytes;
    Router::new()
        .route("/upload", post(upload_artwork))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}
