//! Configuration management for meterflow.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - CLI argument overrides
//! - Validation and defaults

use crate::core::{MeterflowError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Complete configuration for a meterflow node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// This node's identity in the cluster
    pub node: NodeConfig,
    /// Cluster membership snapshot
    pub cluster: ClusterConfig,
    /// Aggregation defaults shared by all roles
    pub aggregation: AggregationConfig,
    /// Metric roles hosted by this node
    pub roles: Vec<RoleConfig>,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Address other peers use to reach this node
    pub address: String,
}

/// Static cluster membership
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Peer addresses, including this node. Empty means single-node mode.
    pub peers: Vec<String>,
}

/// Aggregation defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Interval between batch boundaries
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,
    /// Bounded inbound queue capacity per role
    pub mailbox_capacity: usize,
    /// Distinct identities accepted per generation before shedding new ones
    pub max_identities_per_generation: usize,
    /// Poll interval used while waiting for a frozen generation to be released
    #[serde(with = "humantime_serde")]
    pub drain_poll_interval: Duration,
}

/// Per-role configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    /// Role name (metric type), unique per node
    pub name: String,
    /// Probe storage and merge with the stored row before upsert
    #[serde(default = "default_need_merge")]
    pub need_merge_with_storage: bool,
    /// Overrides `aggregation.mailbox_capacity`
    #[serde(default)]
    pub mailbox_capacity: Option<usize>,
    /// Overrides `aggregation.max_identities_per_generation`
    #[serde(default)]
    pub max_identities: Option<usize>,
    /// Pre-aggregate only: route drained generations to the owner's role of
    /// this name instead of persisting them
    #[serde(default)]
    pub forward_to: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Include targets, thread ids and line numbers
    pub structured: bool,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

fn default_need_merge() -> bool {
    true
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            address: "127.0.0.1:11800".to_string(),
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        AggregationConfig {
            flush_interval: Duration::from_secs(3),
            mailbox_capacity: 512,
            max_identities_per_generation: 1000,
            drain_poll_interval: Duration::from_millis(10),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl RoleConfig {
    /// Create a role with default overrides
    pub fn new(name: impl Into<String>, need_merge_with_storage: bool) -> Self {
        RoleConfig {
            name: name.into(),
            need_merge_with_storage,
            mailbox_capacity: None,
            max_identities: None,
            forward_to: None,
        }
    }

    /// Forward drained generations to `target` on the owning node
    pub fn forward_to(mut self, target: impl Into<String>) -> Self {
        self.forward_to = Some(target.into());
        self
    }

    /// Mailbox capacity after applying the node-wide default
    pub fn mailbox_capacity(&self, defaults: &AggregationConfig) -> usize {
        self.mailbox_capacity.unwrap_or(defaults.mailbox_capacity)
    }

    /// Identity threshold after applying the node-wide default
    pub fn max_identities(&self, defaults: &AggregationConfig) -> usize {
        self.max_identities
            .unwrap_or(defaults.max_identities_per_generation)
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.node.address.is_empty() {
            return Err(MeterflowError::config("node.address must not be empty"));
        }

        if !self.cluster.peers.is_empty() && !self.cluster.peers.contains(&self.node.address) {
            return Err(MeterflowError::config(format!(
                "node address '{}' is not part of cluster.peers",
                self.node.address
            )));
        }

        if self.aggregation.flush_interval.is_zero() {
            return Err(MeterflowError::config("flush_interval must be greater than 0"));
        }

        if self.aggregation.mailbox_capacity == 0 {
            return Err(MeterflowError::config("mailbox_capacity must be greater than 0"));
        }

        if self.aggregation.max_identities_per_generation == 0 {
            return Err(MeterflowError::config(
                "max_identities_per_generation must be greater than 0",
            ));
        }

        let mut seen = HashSet::new();
        for role in &self.roles {
            if role.name.is_empty() {
                return Err(MeterflowError::config("role name must not be empty"));
            }
            if !seen.insert(role.name.as_str()) {
                return Err(MeterflowError::config(format!(
                    "duplicate role name '{}'",
                    role.name
                )));
            }
            if role.mailbox_capacity == Some(0) || role.max_identities == Some(0) {
                return Err(MeterflowError::config(format!(
                    "role '{}' overrides must be greater than 0",
                    role.name
                )));
            }
        }

        for role in &self.roles {
            if let Some(target) = &role.forward_to {
                if target == &role.name {
                    return Err(MeterflowError::config(format!(
                        "role '{}' cannot forward to itself",
                        role.name
                    )));
                }
                if !seen.contains(target.as_str()) {
                    return Err(MeterflowError::config(format!(
                        "role '{}' forwards to unknown role '{}'",
                        role.name, target
                    )));
                }
            }
        }

        Ok(())
    }

    /// Look up a role by name
    pub fn role(&self, name: &str) -> Option<&RoleConfig> {
        self.roles.iter().find(|r| r.name == name)
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| MeterflowError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Set this node's address
    pub fn node_address(mut self, address: impl Into<String>) -> Self {
        self.config.node.address = address.into();
        self
    }

    /// Set the static peer list
    pub fn peers(mut self, peers: Vec<String>) -> Self {
        self.config.cluster.peers = peers;
        self
    }

    /// Set the batch boundary interval
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.aggregation.flush_interval = interval;
        self
    }

    /// Set the default mailbox capacity
    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.config.aggregation.mailbox_capacity = capacity;
        self
    }

    /// Set the default per-generation identity threshold
    pub fn max_identities(mut self, max: usize) -> Self {
        self.config.aggregation.max_identities_per_generation = max;
        self
    }

    /// Add a role
    pub fn role(mut self, role: RoleConfig) -> Self {
        self.config.roles.push(role);
        self
    }

    /// Raise the log level to debug
    pub fn debug(mut self, debug: bool) -> Self {
        if debug {
            self.config.logging.level = LogLevel::Debug;
        }
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
