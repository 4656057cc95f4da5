use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,
    pub frontend_dir_path: Option<String>,

    // Feature configs
    pub storage: Option<StorageConfig>,
    pub thumbnail: Option<ThumbnailConfig>,
    pub ingestion: Option<IngestionConfig>,
    pub auth: Option<AuthConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub base_url: Option<String>,
    /// Prefix for file URLs handed to clients, when it differs from `base_url`.
    pub public_base_url: Option<String>,
    pub app_id: Option<String>,
    pub space_id: Option<String>,
    pub api_key: Option<String>,
    pub timeout_sec: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub enabled: Option<bool>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Resize mode understood by the storage service, e.g. "fit" or "fill".
    pub mode: Option<String>,
    pub quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct IngestionConfig {
    pub similarity_threshold: Option<u32>,
    pub poll_max_retries: Option<u32>,
    pub poll_interval_ms: Option<u64>,
    pub stale_job_threshold_secs: Option<u64>,
    pub abandon_job_after_secs: Option<u64>,
    pub reconcile_interval_secs: Option<u64>,
    pub max_upload_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub api_key_file: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
