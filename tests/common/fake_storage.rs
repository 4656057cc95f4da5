//! In-process stand-in for the external file storage service
//!
//! Speaks the same `{code, message, data}` envelope as the real service. Every job
//! completes immediately and every file gets a thumbnail variant.

use super::constants::*;
use axum::{
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Default)]
struct Files {
    next_id: u64,
    /// file id -> uploaded file name
    stored: HashMap<String, String>,
    deleted: Vec<String>,
}

/// Handle to a running fake storage service. Shuts down when dropped.
pub struct FakeStorageService {
    pub base_url: String,
    files: Arc<Mutex<Files>>,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl FakeStorageService {
    pub async fn spawn() -> Self {
        let files = Arc::new(Mutex::new(Files::default()));
        let app = Router::new()
            .route("/api/v1/files", post(upload_file))
            .route("/api/v1/files/{id}", get(file_info).delete(delete_file))
            .route("/api/v1/jobs/{id}", get(job_progress))
            .with_state(files.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake storage port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Fake storage failed");
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            files,
            _shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Number of files currently stored
    #[allow(dead_code)]
    pub fn stored_count(&self) -> usize {
        self.files.lock().unwrap().stored.len()
    }

    /// Ids of files deleted through the API, in order
    #[allow(dead_code)]
    pub fn deleted_ids(&self) -> Vec<String> {
        self.files.lock().unwrap().deleted.clone()
    }

    /// Drops a file behind the gallery's back, so a later delete sees 404
    #[allow(dead_code)]
    pub fn forget(&self, file_id: &str) {
        self.files.lock().unwrap().stored.remove(file_id);
    }
}

impl Drop for FakeStorageService {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn envelope(data: Value) -> Response {
    Json(json!({"code": 0, "message": "ok", "data": data})).into_response()
}

fn authorized(headers: &HeaderMap) -> bool {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    header("X-API-Key") == Some(STORAGE_API_KEY) && header("X-App-ID") == Some(STORAGE_APP_ID)
}

async fn upload_file(
    State(files): State<Arc<Mutex<Files>>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut name = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("file") {
            name = field.file_name().map(str::to_string);
            let _ = field.bytes().await;
        }
    }
    let Some(name) = name else {
        return Json(json!({"code": 4000, "message": "missing file", "data": null})).into_response();
    };

    let mut files = files.lock().unwrap();
    files.next_id += 1;
    let file_id = format!("file-{}", files.next_id);
    let job_id = format!("job-{}", files.next_id);
    files.stored.insert(file_id.clone(), name);
    envelope(json!({
        "file_id": file_id,
        "job_id": job_id,
        "status_url": format!("/api/v1/jobs/{}", job_id),
        "url": format!("/files/{}.png", file_id),
        "status": "pending",
    }))
}

async fn job_progress(Path(job_id): Path<String>) -> Response {
    envelope(json!({
        "job_id": job_id,
        "status": "task.completed",
        "total_tasks": 2,
        "completed_tasks": 2,
        "failed_tasks": 0,
    }))
}

async fn file_info(
    State(files): State<Arc<Mutex<Files>>>,
    Path(file_id): Path<String>,
) -> Response {
    let files = files.lock().unwrap();
    let Some(name) = files.stored.get(&file_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    envelope(json!({
        "file_id": file_id,
        "name": name,
        "access_url": format!("/files/{}.png", file_id),
        "metadata": {"mime_type": "image/png"},
        "variants": [
            {"type": "thumbnail", "access_url": format!("/files/{}_thumb.png", file_id)}
        ],
    }))
}

async fn delete_file(
    State(files): State<Arc<Mutex<Files>>>,
    headers: HeaderMap,
    Path(file_id): Path<String>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut files = files.lock().unwrap();
    if files.stored.remove(&file_id).is_none() {
        return StatusCode::NOT_FOUND.into_response();
    }
    files.deleted.push(file_id.clone());
    envelope(json!({"file_id": file_id, "deleted": true}))
}
