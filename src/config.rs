//! Repository configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML could not be parsed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Values are inconsistent
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Repository configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Base IRI for resource identifiers and the global grant target
    pub base_uri: String,
    /// Data directory for persistence (None = in-memory only)
    pub data_path: Option<String>,
    /// Hide released objects from anonymous callers
    pub private_mode: bool,
    /// Query time limit in milliseconds (None = run to completion)
    pub query_timeout_ms: Option<u64>,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            base_uri: "http://imeji.org/".to_string(),
            data_path: None,
            private_mode: false,
            query_timeout_ms: None,
        }
    }
}

impl RepoConfig {
    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let config: RepoConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Check that `base_uri` can prefix minted identifiers
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.base_uri.contains("://") {
            return Err(ConfigError::Invalid(format!(
                "base_uri must be an absolute IRI: {}",
                self.base_uri
            )));
        }
        if !self.base_uri.ends_with('/') {
            return Err(ConfigError::Invalid(format!(
                "base_uri must end with '/': {}",
                self.base_uri
            )));
        }
        Ok(())
    }

    /// Named graph IRI for a model name, e.g. `item` → `{base_uri}item`
    pub fn model_graph(&self, model: &str) -> String {
        format!("{}{}", self.base_uri, model)
    }

    /// Query timeout as a duration
    pub fn query_timeout(&self) -> Option<std::time::Duration> {
        self.query_timeout_ms.map(std::time::Duration::from_millis)
    }
}
