//! Configuration parsing and validation.
//!
//! Handles loading configuration from YAML files with environment variable
//! interpolation, so credentials stay environment-provided.

mod vars;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{
    ConfigError, EmptyDatabaseSnafu, EmptySinkPathSnafu, EmptyUriSnafu, EnvInterpolationSnafu,
    ReadFileSnafu, YamlParseSnafu, ZeroFlushIntervalSnafu,
};

/// Main configuration structure for the forwarder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mongo: MongoConfig,
    pub sink: SinkConfig,
    /// Capture behavior (optional, defaults apply).
    #[serde(default)]
    pub forwarder: ForwarderConfig,
    /// Metrics configuration (optional, enabled by default).
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// MongoDB connection and checkpoint placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoConfig {
    /// Connection string. Use `${MONGO_USERNAME}`/`${MONGO_PASSWORD}`
    /// interpolation to keep credentials out of the file.
    pub uri: String,

    /// Database whose collections are watched.
    pub database: String,

    /// Collection holding one resume-token document per watched collection.
    /// Always excluded from watching.
    #[serde(default = "default_checkpoint_collection")]
    pub checkpoint_collection: String,
}

fn default_checkpoint_collection() -> String {
    "resume_tokens".to_string()
}

/// Sink configuration for exported batch objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Destination bucket or directory.
    /// Examples: "s3://bucket/cdc", "/var/lib/millrace/out"
    pub path: String,

    /// Storage options (credentials, region, endpoint, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

/// Capture and batching behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwarderConfig {
    /// Seconds per batch window (default: 300).
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// Collection names never assigned a watcher (administrative or
    /// internal collections). The checkpoint collection is always added.
    #[serde(default)]
    pub denylist: Vec<String>,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: default_flush_interval_secs(),
            denylist: Vec::new(),
        }
    }
}

impl ForwarderConfig {
    /// The batch window length.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

fn default_flush_interval_secs() -> u64 {
    300
}

/// Metrics configuration for the Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    /// Address to bind the metrics HTTP server (default: "0.0.0.0:9090").
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_options(path, true)
    }

    /// Load configuration from a YAML file with optional environment
    /// variable interpolation.
    pub fn from_file_with_options(
        path: impl AsRef<Path>,
        interpolate_env: bool,
    ) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;

        let content = if interpolate_env {
            vars::expand(&content)
                .map_err(|message| EnvInterpolationSnafu { message }.build())?
        } else {
            content
        };

        let config: Config = serde_yaml::from_str(&content).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.mongo.uri.is_empty(), EmptyUriSnafu);
        ensure!(!self.mongo.database.is_empty(), EmptyDatabaseSnafu);
        ensure!(!self.sink.path.is_empty(), EmptySinkPathSnafu);
        ensure!(
            self.forwarder.flush_interval_secs > 0,
            ZeroFlushIntervalSnafu
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_config_yaml_parsing_with_defaults() {
        let config = parse(
            r#"
mongo:
  uri: "mongodb://localhost:27017"
  database: staging
sink:
  path: "s3://cdc-exports"
"#,
        );

        assert_eq!(config.mongo.checkpoint_collection, "resume_tokens");
        assert_eq!(config.forwarder.flush_interval_secs, 300);
        assert!(config.forwarder.denylist.is_empty());
        assert!(config.metrics.enabled);
        config.validate().unwrap();
    }

    #[test]
    fn test_explicit_forwarder_settings() {
        let config = parse(
            r#"
mongo:
  uri: "mongodb://localhost:27017"
  database: staging
  checkpoint_collection: positions
sink:
  path: "/tmp/out"
  storage_options:
    aws_region: us-east-1
forwarder:
  flush_interval_secs: 60
  denylist: [internal_audit, scratch]
"#,
        );

        assert_eq!(config.mongo.checkpoint_collection, "positions");
        assert_eq!(config.forwarder.flush_interval(), Duration::from_secs(60));
        assert_eq!(config.forwarder.denylist, vec!["internal_audit", "scratch"]);
        assert_eq!(
            config.sink.storage_options.get("aws_region").unwrap(),
            "us-east-1"
        );
    }

    #[test]
    fn test_validation_rejects_empty_fields() {
        let config = parse(
            r#"
mongo:
  uri: ""
  database: staging
sink:
  path: "s3://cdc-exports"
"#,
        );
        assert!(matches!(config.validate(), Err(ConfigError::EmptyUri)));

        let config = parse(
            r#"
mongo:
  uri: "mongodb://localhost:27017"
  database: staging
sink:
  path: "s3://cdc-exports"
forwarder:
  flush_interval_secs: 0
"#,
        );
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroFlushInterval)
        ));
    }
}
