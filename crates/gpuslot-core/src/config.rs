//! Configuration types for gpuslot

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::ResourceCatalog;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuslotConfig {
    /// API server configuration
    pub api: ApiConfig,
    /// Admission engine configuration
    pub admission: AdmissionConfig,
    /// Factor extraction configuration
    pub extraction: ExtractionConfig,
    /// Storage configuration
    pub storage: StorageConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Reservable resource types
    pub resources: ResourceCatalog,
}

impl GpuslotConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, crate::GpuslotError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::GpuslotError::Config(format!("Failed to read config file: {}", e))
        })?;
        toml::from_str(&content)
            .map_err(|e| crate::GpuslotError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Layer an optional TOML file under `GPUSLOT__SECTION__KEY` environment
    /// variables. Anything left unset keeps its default.
    pub fn load(path: Option<&Path>) -> Result<Self, crate::GpuslotError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("GPUSLOT")
                .separator("__")
                .try_parsing(true),
        );
        Ok(builder.build()?.try_deserialize()?)
    }
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Address to bind the REST API server
    pub rest_address: String,
    /// Port for the REST API server
    pub rest_port: u16,
    /// Enable CORS
    pub cors_enabled: bool,
    /// Allowed CORS origins
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            rest_address: "0.0.0.0".to_string(),
            rest_port: 9090,
            cors_enabled: true,
            cors_origins: vec!["*".to_string()],
        }
    }
}

/// Admission engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Hours a preemption request stays answerable
    pub preemption_ttl_hours: u32,
    /// Serialize admissions per resource type
    pub serialize_admissions: bool,
    /// Reject reservations whose start is already in the past
    pub reject_past_start: bool,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            preemption_ttl_hours: 24,
            serialize_admissions: true,
            reject_past_start: true,
        }
    }
}

impl AdmissionConfig {
    pub fn preemption_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.preemption_ttl_hours))
    }
}

/// Factor extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Which extractor handles free text
    pub mode: ExtractionMode,
    /// generateContent-style endpoint of the remote model
    pub endpoint: String,
    /// Remote model name
    pub model: String,
    /// API key for the remote model
    pub api_key: Option<String>,
    /// Remote call timeout in seconds
    pub timeout_secs: u64,
    /// Remote calls allowed per usage window
    pub daily_limit: u32,
    /// Length of the usage window in hours
    pub reset_interval_hours: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            mode: ExtractionMode::Rules,
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.0-flash-exp".to_string(),
            api_key: None,
            timeout_secs: 10,
            daily_limit: 1500,
            reset_interval_hours: 24,
        }
    }
}

/// Extraction strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Keyword rules only
    Rules,
    /// Remote model with rule-based fallback
    Remote,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend
    pub backend: StorageBackend,
    /// Snapshot file for the file backend
    pub path: PathBuf,
    /// Upper bound for a single repository call in milliseconds
    pub operation_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: PathBuf::from("/var/lib/gpuslot/state.json"),
            operation_timeout_ms: 5000,
        }
    }
}

impl StorageConfig {
    pub fn operation_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.operation_timeout_ms)
    }
}

/// Storage backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process memory only
    Memory,
    /// In-memory tables persisted to a JSON snapshot
    File,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive
    pub level: String,
    /// Log format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}
