//! Scripted in-process storage service used by unit tests.

use super::*;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub(crate) struct FakeRemoteStorage {
    uploads: Mutex<Vec<UploadFile>>,
    deletes: Mutex<Vec<String>>,
    progress_calls: AtomicUsize,
    scripted_progress: Mutex<VecDeque<Result<String, RemoteStorageError>>>,
    fallback_status: String,
    upload_failure: Mutex<Option<RemoteStorageError>>,
    file_info_failure: Mutex<Option<RemoteStorageError>>,
    with_thumbnail: bool,
    next_id: AtomicUsize,
}

impl FakeRemoteStorage {
    /// Every job reports completion on the first poll.
    pub fn completing() -> Self {
        Self::scripted(Vec::new(), JOB_STATUS_COMPLETED)
    }

    /// Job polls return `statuses` in order, then `fallback` forever.
    pub fn scripted(statuses: Vec<&str>, fallback: &str) -> Self {
        Self {
            uploads: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
            progress_calls: AtomicUsize::new(0),
            scripted_progress: Mutex::new(
                statuses.into_iter().map(|s| Ok(s.to_string())).collect(),
            ),
            fallback_status: fallback.to_string(),
            upload_failure: Mutex::new(None),
            file_info_failure: Mutex::new(None),
            with_thumbnail: true,
            next_id: AtomicUsize::new(1),
        }
    }

    pub fn without_thumbnail(mut self) -> Self {
        self.with_thumbnail = false;
        self
    }

    pub fn push_progress_error(&self, err: RemoteStorageError) {
        self.scripted_progress.lock().unwrap().push_back(Err(err));
    }

    pub fn fail_next_upload(&self, err: RemoteStorageError) {
        *self.upload_failure.lock().unwrap() = Some(err);
    }

    pub fn fail_next_file_info(&self, err: RemoteStorageError) {
        *self.file_info_failure.lock().unwrap() = Some(err);
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    pub fn uploaded_names(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|f| f.name.clone())
            .collect()
    }

    pub fn deleted_ids(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn progress_calls(&self) -> usize {
        self.progress_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStorage for FakeRemoteStorage {
    async fn upload(
        &self,
        file: UploadFile,
        _options: &UploadOptions,
    ) -> Result<UploadReceipt, RemoteStorageError> {
        if let Some(err) = self.upload_failure.lock().unwrap().take() {
            return Err(err);
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.uploads.lock().unwrap().push(file);
        Ok(UploadReceipt {
            file_id: format!("file-{}", n),
            job_id: format!("job-{}", n),
            status_url: format!("/api/v1/jobs/job-{}", n),
            url: String::new(),
            status: "accepted".to_string(),
        })
    }

    async fn delete(&self, file_id: &str) -> Result<DeleteOutcome, RemoteStorageError> {
        self.deletes.lock().unwrap().push(file_id.to_string());
        Ok(DeleteOutcome::Deleted)
    }

    async fn get_file_info(&self, file_id: &str) -> Result<FileInfo, RemoteStorageError> {
        if let Some(err) = self.file_info_failure.lock().unwrap().take() {
            return Err(err);
        }
        let variants = if self.with_thumbnail {
            vec![
                FileVariant {
                    variant_type: "preview".to_string(),
                    path: String::new(),
                    access_url: format!("/files/{}_preview.png", file_id),
                    size: 0,
                },
                FileVariant {
                    variant_type: THUMBNAIL_VARIANT.to_string(),
                    path: String::new(),
                    access_url: format!("/files/{}_thumb.png", file_id),
                    size: 0,
                },
            ]
        } else {
            Vec::new()
        };
        Ok(FileInfo {
            file_id: file_id.to_string(),
            name: String::new(),
            size: 0,
            access_url: format!("/files/{}.png", file_id),
            metadata: FileMetadata::default(),
            variants,
        })
    }

    async fn get_job_progress(&self, job_id: &str) -> Result<JobProgress, RemoteStorageError> {
        self.progress_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.scripted_progress.lock().unwrap().pop_front();
        let status = match next {
            Some(Ok(status)) => status,
            Some(Err(err)) => return Err(err),
            None => self.fallback_status.clone(),
        };
        Ok(JobProgress {
            job_id: job_id.to_string(),
            status,
            total_tasks: 1,
            completed_tasks: 0,
            failed_tasks: 0,
            error_msg: None,
        })
    }
}
