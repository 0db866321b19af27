//! TOML configuration for the bosun daemon.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Node identity and storage location.
    pub node: NodeSection,
    /// Cluster membership.
    pub cluster: ClusterSection,
    /// Reconciliation tuning.
    pub janitor: JanitorSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[node]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Name this node is known by in the cluster. The node ID is derived
    /// from it, so renaming a node changes its identity.
    pub name: String,
    /// Directory for persistent data (the configuration store).
    pub data_dir: PathBuf,
}

impl Default for NodeSection {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .map(|h| h.join(".bosun"))
            .unwrap_or_else(|| PathBuf::from(".bosun"));
        Self {
            name: "local".to_string(),
            data_dir,
        }
    }
}

/// `[cluster]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    /// Names of every cluster member, this node included.
    ///
    /// If empty, the cluster consists of just this node.
    pub nodes: Vec<String>,
}

/// `[janitor]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct JanitorSection {
    /// Seconds between periodic cleanup passes.
    pub pass_interval_secs: Option<u64>,
    /// Seconds to wait for each node's vbucket state answer.
    pub query_timeout_secs: Option<u64>,
    /// Vbuckets for newly created buckets. Must be a power of two.
    pub num_vbuckets: Option<u16>,
    /// Replica copies per vbucket for newly created buckets.
    pub num_replicas: Option<u8>,
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or defaults if no path given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)?;
                let config: CliConfig = toml::from_str(&content)?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Names of every cluster member, defaulting to just this node.
    pub fn member_names(&self) -> Vec<String> {
        if self.cluster.nodes.is_empty() {
            vec![self.node.name.clone()]
        } else {
            self.cluster.nodes.clone()
        }
    }

    /// Effective pause between periodic cleanup passes. Defaults to 10s.
    pub fn pass_interval(&self) -> Duration {
        Duration::from_secs(self.janitor.pass_interval_secs.unwrap_or(10))
    }

    /// Effective per-node state query timeout. Defaults to 10s.
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.janitor.query_timeout_secs.unwrap_or(10))
    }

    /// Effective vbucket count for newly created buckets. Defaults to 64.
    pub fn num_vbuckets(&self) -> u16 {
        self.janitor.num_vbuckets.unwrap_or(64)
    }

    /// Effective replica count for newly created buckets. Defaults to 1.
    pub fn num_replicas(&self) -> u8 {
        self.janitor.num_replicas.unwrap_or(1)
    }
}
