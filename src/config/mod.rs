mod file_config;

pub use file_config::{
    AuthConfig, FileConfig, IngestionConfig, StorageConfig, ThumbnailConfig,
};

use crate::ingestion::{
    OrchestratorConfig, PollerConfig, ReconcilerConfig, DEFAULT_SIMILARITY_THRESHOLD,
};
use crate::remote_storage::{RemoteStorageConfig, ThumbnailOptions, UploadOptions};
use crate::server::{RequestsLoggingLevel, ServerConfig};
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub api_key_file: Option<PathBuf>,
    pub storage_base_url: Option<String>,
    pub storage_app_id: Option<String>,
    pub storage_space_id: Option<String>,
    pub storage_api_key: Option<String>,
    pub storage_timeout_sec: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub api_key_file: PathBuf,

    // Feature configs (with defaults)
    pub storage: StorageSettings,
    pub thumbnail: ThumbnailOptions,
    pub ingestion: IngestionSettings,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub base_url: String,
    pub public_base_url: String,
    pub app_id: String,
    pub space_id: String,
    pub api_key: String,
    pub timeout_sec: u64,
}

#[derive(Debug, Clone)]
pub struct IngestionSettings {
    /// Largest Hamming distance treated as the same picture.
    pub similarity_threshold: u32,
    pub poll_max_retries: u32,
    pub poll_interval_ms: u64,
    /// Upload jobs older than this are settled by the reconciler.
    pub stale_job_threshold_secs: u64,
    /// Stale jobs this old are given up on even when the storage service is unreachable.
    pub abandon_job_after_secs: u64,
    pub reconcile_interval_secs: u64,
    pub max_upload_bytes: usize,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            poll_max_retries: 20,
            poll_interval_ms: 1000,
            stale_job_threshold_secs: 300,
            abandon_job_after_secs: 24 * 60 * 60,
            reconcile_interval_secs: 300,
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);
        if port == metrics_port {
            bail!("port and metrics_port must differ, both are {}", port);
        }

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let frontend_dir_path = file
            .frontend_dir_path
            .or_else(|| cli.frontend_dir_path.clone());

        let api_key_file = file
            .auth
            .and_then(|auth| auth.api_key_file)
            .map(PathBuf::from)
            .or_else(|| cli.api_key_file.clone())
            .unwrap_or_else(|| db_dir.join("api_keys.txt"));

        // Storage service - every value may come from either source
        let storage_file = file.storage.unwrap_or_default();
        let base_url = storage_file
            .base_url
            .or_else(|| cli.storage_base_url.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "storage base_url must be specified via --storage-base-url or in config file"
                )
            })?;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            bail!("storage base_url must be an http(s) URL: {}", base_url);
        }
        let app_id = storage_file
            .app_id
            .or_else(|| cli.storage_app_id.clone())
            .unwrap_or_default();
        if app_id.is_empty() {
            bail!("storage app_id must be specified via --storage-app-id or in config file");
        }
        let api_key = storage_file
            .api_key
            .or_else(|| cli.storage_api_key.clone())
            .unwrap_or_default();
        if api_key.is_empty() {
            bail!("storage api_key must be specified via --storage-api-key or in config file");
        }
        let storage = StorageSettings {
            public_base_url: storage_file
                .public_base_url
                .unwrap_or_else(|| base_url.clone()),
            base_url,
            app_id,
            space_id: storage_file
                .space_id
                .or_else(|| cli.storage_space_id.clone())
                .unwrap_or_default(),
            api_key,
            timeout_sec: storage_file.timeout_sec.unwrap_or(cli.storage_timeout_sec),
        };
        if storage.timeout_sec == 0 {
            bail!("storage timeout_sec must be greater than 0");
        }

        let thumb_file = file.thumbnail.unwrap_or_default();
        let thumb_defaults = ThumbnailOptions::default();
        let thumbnail = ThumbnailOptions {
            enabled: thumb_file.enabled.unwrap_or(thumb_defaults.enabled),
            width: thumb_file.width.unwrap_or(thumb_defaults.width),
            height: thumb_file.height.unwrap_or(thumb_defaults.height),
            mode: thumb_file.mode.unwrap_or(thumb_defaults.mode),
            quality: thumb_file.quality.unwrap_or(thumb_defaults.quality),
        };
        if thumbnail.quality == 0 || thumbnail.quality > 100 {
            bail!("thumbnail quality must be within 1..=100, got {}", thumbnail.quality);
        }

        // Ingestion settings - merge file config with defaults
        let ing_file = file.ingestion.unwrap_or_default();
        let ing_defaults = IngestionSettings::default();
        let ingestion = IngestionSettings {
            similarity_threshold: ing_file
                .similarity_threshold
                .unwrap_or(ing_defaults.similarity_threshold),
            poll_max_retries: ing_file
                .poll_max_retries
                .unwrap_or(ing_defaults.poll_max_retries),
            poll_interval_ms: ing_file
                .poll_interval_ms
                .unwrap_or(ing_defaults.poll_interval_ms),
            stale_job_threshold_secs: ing_file
                .stale_job_threshold_secs
                .unwrap_or(ing_defaults.stale_job_threshold_secs),
            abandon_job_after_secs: ing_file
                .abandon_job_after_secs
                .unwrap_or(ing_defaults.abandon_job_after_secs),
            reconcile_interval_secs: ing_file
                .reconcile_interval_secs
                .unwrap_or(ing_defaults.reconcile_interval_secs),
            max_upload_bytes: ing_file
                .max_upload_bytes
                .unwrap_or(ing_defaults.max_upload_bytes),
        };
        if ingestion.similarity_threshold > 64 {
            bail!(
                "similarity_threshold cannot exceed 64 bits, got {}",
                ingestion.similarity_threshold
            );
        }
        if ingestion.poll_max_retries == 0 {
            bail!("poll_max_retries must be greater than 0");
        }
        if ingestion.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than 0");
        }
        if ingestion.reconcile_interval_secs == 0 {
            bail!("reconcile_interval_secs must be greater than 0");
        }
        if ingestion.max_upload_bytes == 0 {
            bail!("max_upload_bytes must be greater than 0");
        }
        let longest_poll = PollerConfig {
            max_attempts: ingestion.poll_max_retries,
            interval: Duration::from_millis(ingestion.poll_interval_ms),
        }
        .max_duration();
        if Duration::from_secs(ingestion.stale_job_threshold_secs) <= longest_poll {
            bail!(
                "stale_job_threshold_secs ({}) must exceed the longest poll ({:?}), \
                 otherwise live uploads would be reconciled",
                ingestion.stale_job_threshold_secs,
                longest_poll
            );
        }
        if ingestion.abandon_job_after_secs < ingestion.stale_job_threshold_secs {
            bail!(
                "abandon_job_after_secs ({}) cannot be shorter than stale_job_threshold_secs ({})",
                ingestion.abandon_job_after_secs,
                ingestion.stale_job_threshold_secs
            );
        }

        Ok(Self {
            db_dir,
            port,
            metrics_port,
            logging_level,
            frontend_dir_path,
            api_key_file,
            storage,
            thumbnail,
            ingestion,
        })
    }

    pub fn gallery_db_path(&self) -> PathBuf {
        self.db_dir.join("gallery.db")
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            requests_logging_level: self.logging_level.clone(),
            port: self.port,
            metrics_port: self.metrics_port,
            frontend_dir_path: self.frontend_dir_path.clone(),
            max_upload_bytes: self.ingestion.max_upload_bytes,
        }
    }

    pub fn remote_storage_config(&self) -> RemoteStorageConfig {
        RemoteStorageConfig {
            base_url: self.storage.base_url.clone(),
            app_id: self.storage.app_id.clone(),
            space_id: self.storage.space_id.clone(),
            api_key: self.storage.api_key.clone(),
            timeout: Duration::from_secs(self.storage.timeout_sec),
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            max_attempts: self.ingestion.poll_max_retries,
            interval: Duration::from_millis(self.ingestion.poll_interval_ms),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            similarity_threshold: self.ingestion.similarity_threshold,
            public_base_url: self.storage.public_base_url.clone(),
            upload_options: UploadOptions {
                thumbnail: self.thumbnail.clone(),
            },
        }
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            stale_after: Duration::from_secs(self.ingestion.stale_job_threshold_secs),
            abandon_after: Duration::from_secs(self.ingestion.abandon_job_after_secs),
        }
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.ingestion.reconcile_interval_secs)
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
