use super::error_response::ApiError;
use super::state::ServerState;
use super::RequestId;
use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::debug;

pub const HEADER_API_KEY: &str = "X-API-Key";

/// Proof that the request carried an allowed API key.
#[derive(Debug)]
pub struct ApiKey;

impl FromRequestParts<ServerState> for ApiKey {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let request_id = parts
            .extensions
            .get::<RequestId>()
            .cloned()
            .unwrap_or_else(RequestId::generate);

        let provided = parts
            .headers
            .get(HEADER_API_KEY)
            .and_then(|value| value.to_str().ok())
            .map(str::trim);

        match provided {
            Some(key) if state.api_key_policy.is_allowed(key) => Ok(ApiKey),
            Some(_) => {
                debug!("Rejected request with unknown API key");
                Err(ApiError::unauthorized(&request_id))
            }
            None => {
                debug!("Rejected request without API key");
                Err(ApiError::unauthorized(&request_id))
            }
        }
    }
}
