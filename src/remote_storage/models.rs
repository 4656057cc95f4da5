use serde::{Deserialize, Serialize};

/// Job status reported once every processing task finished.
pub const JOB_STATUS_COMPLETED: &str = "task.completed";
/// Job status reported when processing was abandoned by the storage service.
pub const JOB_STATUS_FAILED: &str = "task.failed";

/// Variant type carrying the generated thumbnail.
pub const THUMBNAIL_VARIANT: &str = "thumbnail";

/// Wrapper every storage service response comes in. `code != 0` is a business error.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Envelope {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Acknowledgement of an accepted upload; processing continues asynchronously.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UploadReceipt {
    pub file_id: String,
    pub job_id: String,
    #[serde(default)]
    pub status_url: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct JobProgress {
    pub job_id: String,
    pub status: String,
    #[serde(default)]
    pub total_tasks: u32,
    #[serde(default)]
    pub completed_tasks: u32,
    #[serde(default)]
    pub failed_tasks: u32,
    #[serde(default)]
    pub error_msg: Option<String>,
}

impl JobProgress {
    pub fn is_completed(&self) -> bool {
        self.status == JOB_STATUS_COMPLETED
    }

    pub fn is_failed(&self) -> bool {
        self.status == JOB_STATUS_FAILED
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FileMetadata {
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FileVariant {
    #[serde(rename = "type")]
    pub variant_type: String,
    #[serde(default)]
    pub path: String,
    pub access_url: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FileInfo {
    #[serde(default)]
    pub file_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: u64,
    /// Path relative to the storage service base URL.
    pub access_url: String,
    #[serde(default)]
    pub metadata: FileMetadata,
    #[serde(default)]
    pub variants: Vec<FileVariant>,
}

impl FileInfo {
    /// Access URL of the first thumbnail variant, if any.
    pub fn thumbnail_url(&self) -> Option<&str> {
        self.variants
            .iter()
            .find(|v| v.variant_type == THUMBNAIL_VARIANT)
            .map(|v| v.access_url.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeleteResult {
    #[serde(default)]
    pub file_id: String,
    pub deleted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The storage service did not know the file. Callers treat it as a soft success.
    AlreadyAbsent,
}

/// Thumbnail generation settings forwarded with each upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThumbnailOptions {
    pub enabled: bool,
    pub width: u32,
    pub height: u32,
    pub mode: String,
    pub quality: u8,
}

impl Default for ThumbnailOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            width: 300,
            height: 300,
            mode: "fit".to_string(),
            quality: 85,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadOptions {
    pub thumbnail: ThumbnailOptions,
}
