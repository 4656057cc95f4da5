use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A catalogued image, as exposed to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artwork {
    pub id: i64,
    pub file_id: String,
    pub url: String,
    pub thumbnail_url: String,
    #[serde(rename = "hash")]
    pub content_digest: String,
    #[serde(rename = "phash", skip_serializing_if = "Option::is_none")]
    pub perceptual_digest: Option<u64>,
    pub views: u64,
    pub likes: u64,
    pub bookmarks: u64,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to insert a new artwork. Counters start at zero.
#[derive(Debug, Clone)]
pub struct NewArtwork {
    pub file_id: String,
    pub url: String,
    pub thumbnail_url: String,
    pub content_digest: String,
    pub perceptual_digest: Option<u64>,
    pub tags: Vec<String>,
}

/// Partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtworkUpdate {
    pub url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl ArtworkUpdate {
    pub fn is_empty(&self) -> bool {
        self.url.is_none() && self.thumbnail_url.is_none() && self.tags.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngagementCounter {
    Views,
    Likes,
    Bookmarks,
}

impl EngagementCounter {
    pub(super) fn column(&self) -> &'static str {
        match self {
            EngagementCounter::Views => "views",
            EngagementCounter::Likes => "likes",
            EngagementCounter::Bookmarks => "bookmarks",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngagementCounts {
    pub id: i64,
    pub views: u64,
    pub likes: u64,
    pub bookmarks: u64,
}

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;
pub const DEFAULT_RANDOM_LIMIT: usize = 10;
pub const MAX_RANDOM_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtworkQuery {
    pub page: usize,
    pub page_size: usize,
    /// A record matches when it carries every one of these tags.
    pub tags: Vec<String>,
}

impl ArtworkQuery {
    /// Builds a query from raw client input, replacing out-of-range values with defaults.
    pub fn sanitized(page: Option<i64>, page_size: Option<i64>, tags: Vec<String>) -> Self {
        let page = match page {
            Some(p) if p >= 1 => p as usize,
            _ => 1,
        };
        let page_size = match page_size {
            Some(s) if s >= 1 && s as usize <= MAX_PAGE_SIZE => s as usize,
            _ => DEFAULT_PAGE_SIZE,
        };
        Self {
            page,
            page_size,
            tags: normalize_tags(tags),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page - 1) * self.page_size
    }
}

impl Default for ArtworkQuery {
    fn default() -> Self {
        Self::sanitized(None, None, Vec::new())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtworkPage {
    pub items: Vec<Artwork>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

/// Missing or non-positive limits fall back to the default, large ones are capped.
pub fn sanitize_random_limit(limit: Option<i64>) -> usize {
    match limit {
        Some(l) if l >= 1 => (l as usize).min(MAX_RANDOM_LIMIT),
        _ => DEFAULT_RANDOM_LIMIT,
    }
}

/// Trims tags, drops empty ones and duplicates while keeping first-seen order.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadJobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl UploadJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadJobStatus::Pending => "pending",
            UploadJobStatus::Processing => "processing",
            UploadJobStatus::Completed => "completed",
            UploadJobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(UploadJobStatus::Pending),
            "processing" => Some(UploadJobStatus::Processing),
            "completed" => Some(UploadJobStatus::Completed),
            "failed" => Some(UploadJobStatus::Failed),
            _ => None,
        }
    }
}

/// A delegated upload whose remote processing has not been confirmed yet.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadJob {
    pub id: i64,
    pub content_digest: String,
    pub perceptual_digest: Option<u64>,
    pub file_name: String,
    pub remote_file_id: String,
    pub remote_job_id: String,
    pub status_url: String,
    pub status: UploadJobStatus,
    pub error: Option<String>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewUploadJob {
    pub content_digest: String,
    pub perceptual_digest: Option<u64>,
    pub file_name: String,
    pub remote_file_id: String,
    pub remote_job_id: String,
    pub status_url: String,
}
