//! Pipeline configuration
//!
//! A pipeline config is a YAML document with a `cluster` section and any number
//! of other top-level sections. User files are merged over the built-in
//! defaults one level deep.

pub mod cluster;

pub use cluster::{ClusterConfig, DEFAULT_LOG_LEVEL, DEFAULT_TIMEOUT_SECS};

use std::path::Path;

use serde_yaml::{Mapping, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Fully merged configuration for one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub cluster: ClusterConfig,
    /// The merged document, including `cluster`
    pub document: Mapping,
}

impl PipelineConfig {
    /// Config that only carries a cluster section
    pub fn from_cluster(cluster: ClusterConfig) -> Self {
        let mut document = default_document();
        if let Ok(value) = serde_yaml::to_value(&cluster) {
            document.insert(Value::from("cluster"), value);
        }
        Self { cluster, document }
    }

    /// Look up any top-level section by name
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.document.get(name)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        // The built-in defaults always parse
        parse_document(default_document()).unwrap_or_else(|_| Self {
            cluster: ClusterConfig::default(),
            document: default_document(),
        })
    }
}

// ============================================================================
// SBIO: Pure business logic (no I/O)
// ============================================================================

/// Built-in defaults that user files are merged over
pub fn default_document() -> Mapping {
    let mut dir = Mapping::new();
    dir.insert(Value::from("results"), Value::from("results"));
    dir.insert(Value::from("tmp"), Value::from("tmp"));
    dir.insert(Value::from("log"), Value::from("log"));

    let mut cluster = Mapping::new();
    cluster.insert(Value::from("profile"), Value::from("default"));
    cluster.insert(Value::from("cores"), Value::from(4));

    let mut doc = Mapping::new();
    doc.insert(Value::from("dir"), Value::Mapping(dir));
    doc.insert(Value::from("cluster"), Value::Mapping(cluster));
    doc
}

/// Merge `incoming` over `base`.
///
/// When both sides hold a mapping under the same key the incoming entries are
/// applied one level deep; any other value replaces the default outright.
pub fn merge_documents(base: &mut Mapping, incoming: Mapping) {
    for (key, value) in incoming {
        match value {
            Value::Mapping(update) if matches!(base.get(&key), Some(Value::Mapping(_))) => {
                if let Some(Value::Mapping(existing)) = base.get_mut(&key) {
                    for (k, v) in update {
                        existing.insert(k, v);
                    }
                }
            }
            value => {
                base.insert(key, value);
            }
        }
    }
}

fn parse_document(document: Mapping) -> Result<PipelineConfig, ConfigError> {
    let cluster_value = document
        .get("cluster")
        .cloned()
        .ok_or_else(|| ConfigError::Invalid("missing 'cluster' section".to_string()))?;

    let cluster: ClusterConfig = serde_yaml::from_value(cluster_value)
        .map_err(|e| ConfigError::ParseError(format!("cluster: {}", e)))?;
    cluster.validate()?;

    Ok(PipelineConfig { cluster, document })
}

/// Parse a YAML document and merge it over the defaults
pub fn parse_config(content: &str) -> Result<PipelineConfig, ConfigError> {
    if content.trim().is_empty() {
        return parse_document(default_document());
    }

    let value: Value =
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    let incoming = match value {
        Value::Null => Mapping::new(),
        Value::Mapping(map) => map,
        _ => {
            return Err(ConfigError::Invalid(
                "top level of the config must be a mapping".to_string(),
            ))
        }
    };

    let mut document = default_document();
    merge_documents(&mut document, incoming);
    parse_document(document)
}

// ============================================================================
// SBIO: I/O wrapper - thin layer over pure functions
// ============================================================================

/// Load a config file from disk, overwriting the defaults where it has values
pub fn load_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}
