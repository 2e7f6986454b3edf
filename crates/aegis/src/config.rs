//! Service configuration

use aegis_core::EngineConfig;
use anyhow::{Context, Result};
use serde::Deserialize;

/// Environment variable naming an optional configuration file
pub const CONFIG_PATH_VAR: &str = "AEGIS_CONFIG";

/// Service configuration
///
/// Loaded from the optional file named by `AEGIS_CONFIG`, then overridden by
/// `AEGIS_*` environment variables. Nested keys use `__`, for example
/// `AEGIS_ENGINE__SCHEDULER__EVALUATION_INTERVAL_SECS=15`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Node name reported by the host collector
    pub node_name: String,

    /// API server port for health, metrics and read-only queries
    pub api_port: u16,

    /// Collect utilization of the local host from /proc
    pub host_collector: bool,

    pub engine: EngineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            api_port: 8080,
            host_collector: true,
            engine: EngineConfig::default(),
        }
    }
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

impl AppConfig {
    /// Load configuration from the config file and environment
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_PATH_VAR) {
            builder = builder.add_source(config::File::with_name(&path));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("AEGIS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to read configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("invalid configuration")?;
        config.engine.validate().context("invalid engine configuration")?;
        Ok(config)
    }
}
