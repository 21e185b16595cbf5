//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - config.toml (default configuration)
//! - config.local.toml (git-ignored local overrides)
//! - Environment variables (FEDQUERY_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # config.toml
//! [operators]
//! partition_count = 128
//!
//! [logging]
//! level = "info"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! FEDQUERY_OPERATORS__PARTITION_COUNT=256
//! FEDQUERY_LOGGING__LEVEL=debug
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Top-level configuration for the query engine core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Defaults applied when constructing physical operators.
    pub operators: OperatorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Defaults for physical-operator construction.
///
/// These are starting points handed to [`crate::operators::nested_loop_optional::NestedLoopOptional`]
/// and [`crate::operators::project::Project`]; callers may still override them per-operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Partition count for the NestedLoopOptional hash tables. Must be a power of two.
    #[serde(default = "default_partition_count")]
    pub partition_count: usize,

    /// Bound on each tuple stream's channel capacity (0 = unbounded).
    #[serde(default = "default_stream_capacity")]
    pub stream_capacity: usize,
}

fn default_partition_count() -> usize {
    128
}

fn default_stream_capacity() -> usize {
    1024
}

impl Default for OperatorConfig {
    fn default() -> Self {
        OperatorConfig {
            partition_count: default_partition_count(),
            stream_capacity: default_stream_capacity(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Merges in order:
    /// 1. config.toml (base configuration)
    /// 2. config.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (`FEDQUERY_*` prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("FEDQUERY_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path.
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("FEDQUERY_").split("__"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            operators: OperatorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Initialize the global `tracing` subscriber from a [`LoggingConfig`].
///
/// The core itself never logs on the hot path — diagnostic surfacing is
/// the embedding query engine's job — but it exposes this so a binary
/// built on top of this crate can get the same ambient logging setup.
pub fn init_logging(cfg: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_new(&cfg.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    if cfg.format == "json" {
        let _ = subscriber.json().try_init();
    } else {
        let _ = subscriber.try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.operators.partition_count, 128);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[operators]"));
        assert!(toml_str.contains("[logging]"));
    }
}
