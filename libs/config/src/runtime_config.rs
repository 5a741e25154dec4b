//! Runtime Configuration Module
//!
//! Provides configuration loading for actor registries and the cluster ring.
//! Supports loading from TOML files with environment-specific overrides and
//! `ENTITY_`-prefixed environment variables.

use crate::defaults;
use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Main runtime configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Settings applied to every entity kind
    pub registry: RegistrySettings,

    /// Per-kind replacements for `registry`, keyed by entity kind
    pub kinds: HashMap<String, RegistrySettings>,

    /// Cluster ring configuration
    pub cluster: ClusterSettings,
}

/// Mailbox full-queue strategy as written in configuration files
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackpressureSetting {
    #[default]
    DropNew,
    DropOldest,
    BlockWithTimeout,
    DynamicGrow,
}

/// Settings for one actor registry
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RegistrySettings {
    pub mailbox_capacity: usize,
    pub backpressure: BackpressureSetting,
    /// Only used by `block_with_timeout`
    pub block_timeout_ms: u64,
    pub batch_size: usize,
    pub persist_interval_ms: u64,
    pub idle_timeout_ms: u64,
    /// Resident actor limit; unlimited when absent
    pub max_actors: Option<usize>,
    pub maintenance_interval_ms: u64,
    pub shutdown_timeout_ms: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        use defaults::registry::*;
        Self {
            mailbox_capacity: MAILBOX_CAPACITY,
            backpressure: BackpressureSetting::default(),
            block_timeout_ms: BLOCK_TIMEOUT_MS,
            batch_size: BATCH_SIZE,
            persist_interval_ms: PERSIST_INTERVAL_MS,
            idle_timeout_ms: IDLE_TIMEOUT_MS,
            max_actors: None,
            maintenance_interval_ms: MAINTENANCE_INTERVAL_MS,
            shutdown_timeout_ms: SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl RegistrySettings {
    /// Reject values the runtime cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.mailbox_capacity == 0 {
            bail!("mailbox_capacity must be at least 1");
        }
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.maintenance_interval_ms == 0 {
            bail!("maintenance_interval_ms must be positive");
        }
        if self.max_actors == Some(0) {
            bail!("max_actors must be at least 1 when set");
        }
        Ok(())
    }
}

/// One physical node of the cluster
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct NodeSettings {
    pub id: String,
    pub address: String,
}

/// Cluster ring configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ClusterSettings {
    /// Id of the node this process runs as
    pub node_id: String,
    /// Address advertised for this node
    pub address: String,
    pub virtual_nodes: usize,
    /// Initial membership; the membership service replaces it at runtime
    pub seed_nodes: Vec<NodeSettings>,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            node_id: defaults::cluster::LOCAL_NODE_ID.to_string(),
            address: String::new(),
            virtual_nodes: defaults::cluster::VIRTUAL_NODES,
            seed_nodes: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from files with environment overrides
    pub fn load(base_path: Option<&Path>, environment: Option<&str>) -> Result<Self> {
        let base = base_path.unwrap_or(Path::new("config/runtime.toml"));

        let mut builder = Config::builder().add_source(File::from(base).required(true));

        // Add environment-specific overrides if specified
        if let Some(env) = environment {
            let env_file = base
                .parent()
                .unwrap_or(Path::new("."))
                .join("environments")
                .join(format!("{}.toml", env));

            if env_file.exists() {
                info!("Loading environment config: {:?}", env_file);
                builder = builder.add_source(File::from(env_file));
            } else {
                warn!("Environment config not found: {:?}", env_file);
            }
        }

        // Override with environment variables, e.g. ENTITY_REGISTRY__BATCH_SIZE=50
        builder = builder.add_source(
            Environment::with_prefix(defaults::ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        debug!(kinds = config.kinds.len(), "Runtime configuration loaded");
        Ok(config)
    }

    /// Settings for an entity kind, falling back to the global registry block
    pub fn settings_for(&self, kind: &str) -> &RegistrySettings {
        self.kinds.get(kind).unwrap_or(&self.registry)
    }

    /// Validate every registry block and the cluster block
    pub fn validate(&self) -> Result<()> {
        self.registry.validate().context("invalid [registry] settings")?;
        for (kind, settings) in &self.kinds {
            settings
                .validate()
                .with_context(|| format!("invalid [kinds.{}] settings", kind))?;
        }
        if self.cluster.virtual_nodes == 0 {
            bail!("cluster.virtual_nodes must be at least 1");
        }
        if self.cluster.node_id.is_empty() {
            bail!("cluster.node_id must not be empty");
        }
        Ok(())
    }

    /// Expand environment variables in node addresses
    pub fn expand_env_vars(&mut self) -> Result<()> {
        let expanded = shellexpand::env(&self.cluster.address)
            .context("Failed to expand cluster address")?;
        self.cluster.address = expanded.to_string();

        for node in &mut self.cluster.seed_nodes {
            let expanded = shellexpand::env(&node.address)
                .with_context(|| format!("Failed to expand address of node {}", node.id))?;
            node.address = expanded.to_string();
        }

        Ok(())
    }

    /// Path of the default configuration file
    pub fn default_path() -> PathBuf {
        PathBuf::from("config/runtime.toml")
    }
}

/// Convenience function to load, expand and validate configuration
pub fn load_config(base_path: Option<&Path>, environment: Option<&str>) -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::load(base_path, environment)?;
    config.expand_env_vars()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const BASE: &str = r#"
[registry]
mailbox_capacity = 256
backpressure = "block_with_timeout"
block_timeout_ms = 500

[kinds.guild]
mailbox_capacity = 4096
backpressure = "dynamic_grow"
max_actors = 10000

[cluster]
node_id = "node-a"
address = "10.0.0.1:7000"
virtual_nodes = 64

[[cluster.seed_nodes]]
id = "node-b"
address = "10.0.0.2:7000"
"#;

    #[test]
    fn test_load_base_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("runtime.toml");
        fs::write(&config_path, BASE).unwrap();

        let config = load_config(Some(&config_path), None).unwrap();

        assert_eq!(config.registry.mailbox_capacity, 256);
        assert_eq!(config.registry.backpressure, BackpressureSetting::BlockWithTimeout);
        assert_eq!(config.registry.block_timeout_ms, 500);
        // unspecified fields keep their defaults
        assert_eq!(config.registry.batch_size, defaults::registry::BATCH_SIZE);

        let guild = config.settings_for("guild");
        assert_eq!(guild.mailbox_capacity, 4096);
        assert_eq!(guild.max_actors, Some(10000));
        assert_eq!(config.settings_for("player"), &config.registry);

        assert_eq!(config.cluster.node_id, "node-a");
        assert_eq!(config.cluster.virtual_nodes, 64);
        assert_eq!(config.cluster.seed_nodes.len(), 1);
    }

    #[test]
    fn test_environment_override_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("runtime.toml");
        fs::write(&config_path, BASE).unwrap();
        fs::create_dir(dir.path().join("environments")).unwrap();
        fs::write(
            dir.path().join("environments").join("staging.toml"),
            "[registry]\nbatch_size = 25\n",
        )
        .unwrap();

        let config = load_config(Some(&config_path), Some("staging")).unwrap();
        assert_eq!(config.registry.batch_size, 25);
        assert_eq!(config.registry.mailbox_capacity, 256);
    }

    #[test]
    fn test_validation_rejects_zero_batch() {
        let mut config = RuntimeConfig::default();
        assert!(config.validate().is_ok());

        config.registry.batch_size = 0;
        assert!(config.validate().is_err());
    }
}
