//! YAML application config.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use minterindex_core::IndexerConfig;
use minterindex_node::NodeConfig;
use minterindex_storage::StorageConfig;

use crate::logging::LogConfig;

/// Everything the `minterindex` binary needs, one section per component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub node: NodeConfig,
    pub storage: StorageConfig,
    pub indexer: IndexerConfig,
    pub log: LogConfig,
}

impl AppConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text).context("invalid config YAML")?;
        config
            .indexer
            .validate()
            .context("invalid indexer section")?;
        Ok(config)
    }

    /// Load `path`, or fall back to defaults when `optional` and the file is
    /// missing.
    pub fn load(path: &Path, optional: bool) -> Result<Self> {
        if optional && !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("loading {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minterindex_storage::Backend;

    #[test]
    fn empty_document_is_defaults() {
        let cfg = AppConfig::from_yaml("{}").unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.node.timeout_ms, 1000);
        assert_eq!(cfg.storage.backend, Backend::Memory);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let cfg = AppConfig::from_yaml(
            r#"
node:
  url: "http://node.example:8841"
storage:
  backend: sqlite
  url: "minter.db"
indexer:
  from_height: 100
  retry:
    max_backoff_ms: 2000
log:
  level: debug
  json: true
"#,
        )
        .unwrap();

        assert_eq!(cfg.node.url, "http://node.example:8841");
        assert_eq!(cfg.node.timeout_ms, 1000);
        assert_eq!(cfg.storage.backend, Backend::Sqlite);
        assert_eq!(cfg.storage.max_connections, 10);
        assert_eq!(cfg.indexer.from_height, 100);
        assert_eq!(cfg.indexer.retry.max_backoff_ms, 2000);
        assert_eq!(cfg.indexer.retry.initial_backoff_ms, 100);
        assert_eq!(cfg.log.level, "debug");
        assert!(cfg.log.json);
    }

    #[test]
    fn invalid_indexer_section_is_rejected() {
        let err = AppConfig::from_yaml("indexer:\n  validator_queue_capacity: 0\n").unwrap_err();
        assert!(format!("{err:#}").contains("invalid indexer section"));
    }

    #[test]
    fn missing_optional_file_is_defaults() {
        let cfg = AppConfig::load(Path::new("/nonexistent/minterindex.yaml"), true).unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert!(AppConfig::load(Path::new("/nonexistent/minterindex.yaml"), false).is_err());
    }

    #[test]
    fn example_config_parses() {
        let text = include_str!("../config/minterindex.example.yaml");
        let cfg = AppConfig::from_yaml(text).unwrap();
        assert_eq!(cfg.storage.backend, Backend::Postgres);
    }
}
