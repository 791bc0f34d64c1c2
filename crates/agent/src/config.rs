//! Service configuration
//!
//! Sources, later overriding earlier:
//! 1. Optional file named by `HEALER_CONFIG` (format from its extension)
//! 2. `HEALER_*` environment variables, `__` separating nested keys,
//!    e.g. `HEALER_ENGINE__PREDICTIVE__ANOMALY_THRESHOLD=0.02`

use anyhow::{Context, Result};
use healer_lib::EngineConfig;
use serde::Deserialize;
use std::path::PathBuf;

/// Environment variable naming an optional config file
pub const CONFIG_FILE_ENV: &str = "HEALER_CONFIG";

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Service name attached to every structured log event
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// HTTP port for the trigger, health and metrics routes
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Prometheus server used by metric collection
    #[serde(default)]
    pub prometheus_url: Option<String>,

    /// Path to the ONNX reconstruction model
    #[serde(default)]
    pub model_path: Option<PathBuf>,

    /// Expected SHA-256 of the model artifact, hex encoded
    #[serde(default)]
    pub model_sha256: Option<String>,

    #[serde(default = "default_model_version")]
    pub model_version: String,

    /// Run with the mean reconstructor when no model is configured
    #[serde(default)]
    pub allow_fallback_model: bool,

    /// Periodic collection interval; 0 leaves collection to callers
    #[serde(default)]
    pub collection_interval_secs: u64,

    /// Use the in-process cluster instead of the Kubernetes API
    #[serde(default)]
    pub use_in_memory_cluster: bool,

    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_service_name() -> String {
    "pod-healer".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_model_version() -> String {
    "v1".to_string()
}

impl AgentConfig {
    /// Load configuration from the config file and process environment
    pub fn load() -> Result<Self> {
        let file = std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from);
        Self::from_sources(file, config::Environment::with_prefix("HEALER"))
    }

    fn from_sources(file: Option<PathBuf>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = &file {
            builder = builder.add_source(config::File::from(path.as_path()));
        }

        let config = builder
            .add_source(env.prefix_separator("_").separator("__").try_parsing(true))
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid configuration")
    }
}
