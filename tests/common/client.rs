//! HTTP client for end-to-end tests
//!
//! Wraps reqwest and provides methods for all gallery endpoints.
//! When API routes or request formats change, update only this file.

use super::constants::*;
use reqwest::multipart::{Form, Part};
use reqwest::Response;
use serde_json::Value;
use std::time::Duration;

const ARTWORKS: &str = "/api/v1/artworks";

/// HTTP test client, optionally presenting an API key
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
    api_key: Option<String>,
}

#[allow(dead_code)]
impl TestClient {
    /// Creates a client without an API key
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url,
            api_key: None,
        }
    }

    /// Creates a client presenting the test server's API key
    pub fn with_api_key(base_url: String) -> Self {
        Self {
            api_key: Some(TEST_API_KEY.to_string()),
            ..Self::new(base_url)
        }
    }

    /// Creates a client presenting an arbitrary key
    pub fn with_custom_key(base_url: String, key: &str) -> Self {
        Self {
            api_key: Some(key.to_string()),
            ..Self::new(base_url)
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, ARTWORKS, path)
    }

    fn keyed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("X-API-Key", key),
            None => request,
        }
    }

    // ========================================================================
    // Upload
    // ========================================================================

    /// POST /upload with a single `file` part
    pub async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Response {
        let part = Part::bytes(bytes).file_name(file_name.to_string());
        let form = Form::new().part("file", part);
        self.client
            .post(self.url("/upload"))
            .multipart(form)
            .send()
            .await
            .expect("Upload request failed")
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// GET /{id}
    pub async fn get_artwork(&self, id: i64) -> Response {
        self.client
            .get(self.url(&format!("/{}", id)))
            .send()
            .await
            .expect("Get artwork request failed")
    }

    /// GET / with a raw query string, e.g. "page=2&tags=cats"
    pub async fn list_artworks(&self, query: &str) -> Response {
        self.client
            .get(format!("{}?{}", self.url(""), query))
            .send()
            .await
            .expect("List artworks request failed")
    }

    /// GET /random, optionally with a limit
    pub async fn random_artworks(&self, limit: Option<i64>) -> Response {
        let mut request = self.client.get(self.url("/random"));
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        request.send().await.expect("Random artworks request failed")
    }

    // ========================================================================
    // Engagement
    // ========================================================================

    /// POST /{id}/{action} where action is like, unlike, bookmark or unbookmark
    pub async fn engage(&self, id: i64, action: &str) -> Response {
        self.client
            .post(self.url(&format!("/{}/{}", id, action)))
            .send()
            .await
            .expect("Engagement request failed")
    }

    // ========================================================================
    // Management (API key)
    // ========================================================================

    /// PUT /{id} with a JSON body
    pub async fn update_artwork(&self, id: i64, body: &Value) -> Response {
        self.keyed(self.client.put(self.url(&format!("/{}", id))))
            .json(body)
            .send()
            .await
            .expect("Update artwork request failed")
    }

    /// DELETE /{id}
    pub async fn delete_artwork(&self, id: i64) -> Response {
        self.keyed(self.client.delete(self.url(&format!("/{}", id))))
            .send()
            .await
            .expect("Delete artwork request failed")
    }
}
