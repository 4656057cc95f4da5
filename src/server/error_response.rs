use super::RequestId;
use crate::artwork_store::CatalogError;
use crate::ingestion::IngestionError;
use crate::remote_storage::RemoteStorageError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

const INTERNAL_ERROR_MESSAGE: &str = "internal error";

/// JSON error reply. Internal failures are logged here and reported with an opaque message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    request_id: RequestId,
    existing_id: Option<i64>,
    distance: Option<u32>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    request_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    existing_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    distance: Option<u32>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>, request_id: &RequestId) -> Self {
        Self {
            status,
            message: message.into(),
            request_id: request_id.clone(),
            existing_id: None,
            distance: None,
        }
    }

    pub fn bad_request(message: impl Into<String>, request_id: &RequestId) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, request_id)
    }

    pub fn not_found(request_id: &RequestId) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not found", request_id)
    }

    pub fn unauthorized(request_id: &RequestId) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "missing or invalid API key", request_id)
    }

    /// Logs `cause` and hides it from the client.
    pub fn internal(cause: &dyn std::fmt::Display, request_id: &RequestId) -> Self {
        error!("Request {} failed: {}", request_id, cause);
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            INTERNAL_ERROR_MESSAGE,
            request_id,
        )
    }

    pub fn from_catalog(err: CatalogError, request_id: &RequestId) -> Self {
        Self::internal(&err, request_id)
    }

    pub fn from_remote(err: RemoteStorageError, request_id: &RequestId) -> Self {
        Self::internal(&err, request_id)
    }

    pub fn from_ingestion(err: IngestionError, request_id: &RequestId) -> Self {
        match err {
            IngestionError::BadInput(message) => Self::bad_request(message, request_id),
            IngestionError::Duplicate {
                existing_id,
                distance,
            } => {
                let message = match distance {
                    None => "identical content already exists".to_string(),
                    Some(_) => "visually similar content already exists".to_string(),
                };
                Self {
                    existing_id: Some(existing_id),
                    distance,
                    ..Self::new(StatusCode::CONFLICT, message, request_id)
                }
            }
            IngestionError::Cancelled => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "request cancelled, server is shutting down",
                request_id,
            ),
            other => Self::internal(&other, request_id),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: &self.message,
            request_id: self.request_id.as_str(),
            existing_id: self.existing_id,
            distance: self.distance,
        };
        (self.status, Json(body)).into_response()
    }
}
