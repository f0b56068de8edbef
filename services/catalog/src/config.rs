use chrono::{Datelike, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the catalog service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// S3 configuration
    pub s3: S3Config,
    /// Upload ceilings
    #[serde(default)]
    pub media: MediaConfig,
    /// Catalog rules
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// S3-compatible object storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Bucket holding covers and videos
    pub bucket: String,
    /// AWS region ("auto" for R2)
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for R2, MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Public base URL objects are served from, without trailing slash
    pub public_base_url: String,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Run migrations on startup
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

/// Upload size ceilings
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Largest accepted cover upload, before re-encoding
    #[serde(default = "default_max_cover_bytes")]
    pub max_cover_bytes: usize,
    /// Largest accepted video upload
    #[serde(default = "default_max_video_bytes")]
    pub max_video_bytes: usize,
}

/// Catalog rules
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// First exhibition year a project may belong to
    #[serde(default = "default_start_year")]
    pub start_year: i32,
    /// Pins the latest accepted year instead of reading the clock at startup
    #[serde(default)]
    pub current_year: Option<i32>,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Resolved limits the catalog services are constructed with.
///
/// Nothing below the configuration layer reads the clock or the environment;
/// year bounds and size ceilings are fixed for the lifetime of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogLimits {
    pub max_cover_bytes: usize,
    pub max_video_bytes: usize,
    pub start_year: i32,
    pub current_year: i32,
}

impl CatalogLimits {
    /// Limits with the default ceilings and an explicit year window
    pub fn new(start_year: i32, current_year: i32) -> Self {
        Self {
            max_cover_bytes: default_max_cover_bytes(),
            max_video_bytes: default_max_video_bytes(),
            start_year,
            current_year,
        }
    }
}

// Default value functions
fn default_service_name() -> String {
    "catalog-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_region() -> String {
    "auto".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_run_migrations() -> bool {
    true
}

fn default_max_cover_bytes() -> usize {
    3 * 1024 * 1024 // 3MiB
}

fn default_max_video_bytes() -> usize {
    100 * 1024 * 1024 // 100MiB
}

fn default_start_year() -> i32 {
    2024
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .set_default("service.name", "catalog-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            .add_source(config::File::with_name("config/catalog").required(false))
            .add_source(config::File::with_name("/etc/exhibit/catalog").required(false))
            // CATALOG__S3__BUCKET -> s3.bucket
            .add_source(
                config::Environment::with_prefix("CATALOG")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Resolve the limits handed to the catalog services.
    ///
    /// The clock is read here, once, when no year override is configured.
    pub fn limits(&self) -> CatalogLimits {
        let current_year = self
            .catalog
            .current_year
            .unwrap_or_else(|| Utc::now().year());

        CatalogLimits {
            max_cover_bytes: self.media.max_cover_bytes,
            max_video_bytes: self.media.max_video_bytes,
            start_year: self.catalog.start_year,
            current_year,
        }
    }

    /// Largest request body the admin API has to accept
    pub fn max_request_bytes(&self) -> usize {
        self.media.max_cover_bytes + self.media.max_video_bytes + 1024 * 1024
    }

    /// Get database connection timeout as Duration
    pub fn db_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.database.connect_timeout_secs)
    }

    /// Get database idle timeout as Duration
    pub fn db_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.database.idle_timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_cover_bytes: default_max_cover_bytes(),
            max_video_bytes: default_max_video_bytes(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            start_year: default_start_year(),
            current_year: None,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
        }
    }
}
