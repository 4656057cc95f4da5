use super::models::*;
use super::{RemoteStorage, RemoteStorageError, UploadFile};
use crate::server::metrics::record_remote_storage_call;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// Longest slice of an error body kept in errors and logs.
const MAX_ERROR_BODY_LENGTH: usize = 512;

#[derive(Debug, Clone)]
pub struct RemoteStorageConfig {
    pub base_url: String,
    pub app_id: String,
    pub space_id: String,
    pub api_key: String,
    pub timeout: Duration,
}

/// HTTP client for the storage service's `/api/v1` surface.
#[derive(Clone)]
pub struct HttpRemoteStorage {
    client: Client,
    base_url: String,
    app_id: String,
    space_id: String,
}

impl HttpRemoteStorage {
    pub fn new(config: &RemoteStorageConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-App-ID",
            HeaderValue::from_str(&config.app_id).context("Invalid storage app id")?,
        );
        let mut api_key =
            HeaderValue::from_str(&config.api_key).context("Invalid storage api key")?;
        api_key.set_sensitive(true);
        headers.insert("X-API-Key", api_key);

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_id: config.app_id.clone(),
            space_id: config.space_id.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn upload_inner(
        &self,
        file: UploadFile,
        options: &UploadOptions,
    ) -> Result<UploadReceipt, RemoteStorageError> {
        let options_json = serde_json::to_string(options)
            .map_err(|e| RemoteStorageError::MalformedEnvelope(e.to_string()))?;

        let mut part = Part::bytes(file.bytes).file_name(file.name);
        if let Some(content_type) = file.content_type.as_deref() {
            part = part.mime_str(content_type)?;
        }
        let form = Form::new()
            .text("app_id", self.app_id.clone())
            .text("space_id", self.space_id.clone())
            .text("options", options_json)
            .part("file", part);

        let url = format!("{}/api/v1/files", self.base_url);
        let response = self.client.post(&url).multipart(form).send().await?;
        decode_response(response).await
    }

    async fn delete_inner(&self, file_id: &str) -> Result<DeleteOutcome, RemoteStorageError> {
        let url = format!("{}/api/v1/files/{}", self.base_url, file_id);
        let response = self.client.delete(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(DeleteOutcome::AlreadyAbsent);
        }
        let result: DeleteResult = decode_response(response).await?;
        Ok(if result.deleted {
            DeleteOutcome::Deleted
        } else {
            DeleteOutcome::AlreadyAbsent
        })
    }

    async fn get_file_info_inner(&self, file_id: &str) -> Result<FileInfo, RemoteStorageError> {
        let url = format!("{}/api/v1/files/{}", self.base_url, file_id);
        let response = self.client.get(&url).send().await?;
        decode_response(response).await
    }

    async fn get_job_progress_inner(&self, job_id: &str) -> Result<JobProgress, RemoteStorageError> {
        let url = format!("{}/api/v1/jobs/{}", self.base_url, job_id);
        let response = self.client.get(&url).send().await?;
        decode_response(response).await
    }
}

fn observe<T>(operation: &str, result: &Result<T, RemoteStorageError>) {
    record_remote_storage_call(operation, result.is_ok());
    if let Err(err) = result {
        warn!("Storage service {} failed: {}", operation, err);
    }
}

#[async_trait]
impl RemoteStorage for HttpRemoteStorage {
    async fn upload(
        &self,
        file: UploadFile,
        options: &UploadOptions,
    ) -> Result<UploadReceipt, RemoteStorageError> {
        debug!("Uploading {} ({} bytes)", file.name, file.bytes.len());
        let result = self.upload_inner(file, options).await;
        observe("upload", &result);
        result
    }

    async fn delete(&self, file_id: &str) -> Result<DeleteOutcome, RemoteStorageError> {
        debug!("Deleting remote file {}", file_id);
        let result = self.delete_inner(file_id).await;
        observe("delete", &result);
        result
    }

    async fn get_file_info(&self, file_id: &str) -> Result<FileInfo, RemoteStorageError> {
        let result = self.get_file_info_inner(file_id).await;
        observe("file_info", &result);
        result
    }

    async fn get_job_progress(&self, job_id: &str) -> Result<JobProgress, RemoteStorageError> {
        let result = self.get_job_progress_inner(job_id).await;
        observe("job_progress", &result);
        result
    }
}

async fn decode_response<T: DeserializeOwned>(response: Response) -> Result<T, RemoteStorageError> {
    let status = response.status();
    let body = response.bytes().await?;
    if !status.is_success() {
        let shown = &body[..body.len().min(MAX_ERROR_BODY_LENGTH)];
        return Err(RemoteStorageError::Status {
            status: status.as_u16(),
            body: String::from_utf8_lossy(shown).into_owned(),
        });
    }
    decode_envelope(&body)
}

/// Unwraps `{code, message, data}` and decodes `data` into the call-specific shape.
pub(crate) fn decode_envelope<T: DeserializeOwned>(body: &[u8]) -> Result<T, RemoteStorageError> {
    let envelope: Envelope = serde_json::from_slice(body)
        .map_err(|e| RemoteStorageError::MalformedEnvelope(e.to_string()))?;
    if envelope.code != 0 {
        return Err(RemoteStorageError::Business {
            code: envelope.code,
            message: envelope.message,
        });
    }
    let data = envelope
        .data
        .ok_or_else(|| RemoteStorageError::MalformedEnvelope("missing data".to_string()))?;
    serde_json::from_value(data).map_err(|e| RemoteStorageError::MalformedEnvelope(e.to_string()))
}
