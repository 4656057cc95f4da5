//! Catalog read, engagement and maintenance routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::{info, warn};

use super::api_key::ApiKey;
use super::error_response::ApiError;
use super::metrics::record_artwork_deleted;
use super::state::{GuardedArtworkStore, GuardedRemoteStorage, ServerState};
use super::RequestId;
use crate::artwork_store::{
    sanitize_random_limit, ArtworkQuery, ArtworkUpdate, EngagementCounter,
};
use crate::remote_storage::DeleteOutcome;

#[derive(Debug, Deserialize)]
struct ListParams {
    page: Option<i64>,
    page_size: Option<i64>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RandomParams {
    limit: Option<i64>,
}

async fn list_artworks(
    State(store): State<GuardedArtworkStore>,
    request_id: RequestId,
    axum_extra::extract::Query(params): axum_extra::extract::Query<ListParams>,
) -> Response {
    let query = ArtworkQuery::sanitized(params.page, params.page_size, params.tags);
    match store.list_artworks(&query) {
        Ok(page) => Json(page).into_response(),
        Err(err) => ApiError::from_catalog(err, &request_id).into_response(),
    }
}

async fn random_artworks(
    State(store): State<GuardedArtworkStore>,
    request_id: RequestId,
    Query(params): Query<RandomParams>,
) -> Response {
    match store.random_artworks(sanitize_random_limit(params.limit)) {
        Ok(artworks) => Json(artworks).into_response(),
        Err(err) => ApiError::from_catalog(err, &request_id).into_response(),
    }
}

/// Counts the view, then returns the record including it.
async fn get_artwork(
    State(store): State<GuardedArtworkStore>,
    request_id: RequestId,
    Path(id): Path<i64>,
) -> Response {
    match store.increment_counter(id, EngagementCounter::Views) {
        Ok(Some(_)) => {}
        Ok(None) => return ApiError::not_found(&request_id).into_response(),
        Err(err) => return ApiError::from_catalog(err, &request_id).into_response(),
    }
    match store.get_artwork(id) {
        Ok(Some(artwork)) => Json(artwork).into_response(),
        Ok(None) => ApiError::not_found(&request_id).into_response(),
        Err(err) => ApiError::from_catalog(err, &request_id).into_response(),
    }
}

fn engage(
    store: &GuardedArtworkStore,
    request_id: &RequestId,
    id: i64,
    counter: EngagementCounter,
    increment: bool,
) -> Response {
    let result = if increment {
        store.increment_counter(id, counter)
    } else {
        store.decrement_counter(id, counter)
    };
    match result {
        Ok(Some(counts)) => Json(counts).into_response(),
        Ok(None) => ApiError::not_found(request_id).into_response(),
        Err(err) => ApiError::from_catalog(err, request_id).into_response(),
    }
}

async fn like_artwork(
    State(store): State<GuardedArtworkStore>,
    request_id: RequestId,
    Path(id): Path<i64>,
) -> Response {
    engage(&store, &request_id, id, EngagementCounter::Likes, true)
}

async fn unlike_artwork(
    State(store): State<GuardedArtworkStore>,
    request_id: RequestId,
    Path(id): Path<i64>,
) -> Response {
    engage(&store, &request_id, id, EngagementCounter::Likes, false)
}

async fn bookmark_artwork(
    State(store): State<GuardedArtworkStore>,
    request_id: RequestId,
    Path(id): Path<i64>,
) -> Response {
    engage(&store, &request_id, id, EngagementCounter::Bookmarks, true)
}

async fn unbookmark_artwork(
    State(store): State<GuardedArtworkStore>,
    request_id: RequestId,
    Path(id): Path<i64>,
) -> Response {
    engage(&store, &request_id, id, EngagementCounter::Bookmarks, false)
}

async fn update_artwork(
    _api_key: ApiKey,
    State(store): State<GuardedArtworkStore>,
    request_id: RequestId,
    Path(id): Path<i64>,
    Json(update): Json<ArtworkUpdate>,
) -> Response {
    if update.is_empty() {
        return ApiError::bad_request("nothing to update", &request_id).into_response();
    }
    let blank_url = update.url.as_deref().is_some_and(|url| url.trim().is_empty());
    if blank_url {
        return ApiError::bad_request("url must not be empty", &request_id).into_response();
    }
    match store.update_artwork(id, &update) {
        Ok(Some(artwork)) => {
            info!("Updated artwork {}", id);
            Json(artwork).into_response()
        }
        Ok(None) => ApiError::not_found(&request_id).into_response(),
        Err(err) => ApiError::from_catalog(err, &request_id).into_response(),
    }
}

/// Removes the stored file first; the record survives if the storage service fails.
async fn delete_artwork(
    _api_key: ApiKey,
    State(store): State<GuardedArtworkStore>,
    State(remote): State<GuardedRemoteStorage>,
    request_id: RequestId,
    Path(id): Path<i64>,
) -> Response {
    let artwork = match store.get_artwork(id) {
        Ok(Some(artwork)) => artwork,
        Ok(None) => return ApiError::not_found(&request_id).into_response(),
        Err(err) => return ApiError::from_catalog(err, &request_id).into_response(),
    };

    match remote.delete(&artwork.file_id).await {
        Ok(DeleteOutcome::Deleted) => {}
        Ok(DeleteOutcome::AlreadyAbsent) => {
            warn!(
                "Remote file {} of artwork {} was already gone",
                artwork.file_id, id
            );
        }
        Err(err) => return ApiError::from_remote(err, &request_id).into_response(),
    }

    match store.soft_delete_artwork(id) {
        Ok(true) => {
            record_artwork_deleted();
            info!("Deleted artwork {} ({})", id, artwork.file_id);
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => ApiError::not_found(&request_id).into_response(),
        Err(err) => ApiError::from_catalog(err, &request_id).into_response(),
    }
}

pub fn make_artwork_routes(state: ServerState) -> Router {
    Router::new()
        .route("/", get(list_artworks))
        .route("/random", get(random_artworks))
        .route(
            "/{id}",
            get(get_artwork).put(update_artwork).delete(delete_artwork),
        )
        .route("/{id}/like", post(like_artwork))
        .route("/{id}/unlike", post(unlike_artwork))
        .route("/{id}/bookmark", post(bookmark_artwork))
        .route("/{id}/unbookmark", post(unbookmark_artwork))
        .with_state(state)
}
