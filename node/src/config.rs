//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use agora_governance::GovernanceParams;

use crate::logging::LogFormat;
use crate::retry::RetryPolicy;
use crate::NodeError;

/// Configuration for a reconciler node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Data directory for the LMDB projection.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// LMDB map size in bytes.
    #[serde(default = "default_map_size")]
    pub map_size: usize,

    #[serde(default = "default_max_dbs")]
    pub max_dbs: u32,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Upper bound on event applications running at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Whether to register Prometheus metrics.
    #[serde(default)]
    pub enable_metrics: bool,

    /// Authorisation and timing rules.
    #[serde(default)]
    pub governance: GovernanceParams,

    /// Backoff for events that arrive before their prerequisite.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Backoff between attempts to re-establish the event subscription.
    #[serde(default = "default_resubscribe")]
    pub resubscribe: RetryPolicy,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_map_size() -> usize {
    1 << 30
}

fn default_max_dbs() -> u32 {
    16
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_resubscribe() -> RetryPolicy {
    RetryPolicy {
        initial_ms: 500,
        ..RetryPolicy::default()
    }
}

fn default_max_concurrent() -> usize {
    8
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn log_format(&self) -> Result<LogFormat, NodeError> {
        self.log_format.parse()
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            map_size: default_map_size(),
            max_dbs: default_max_dbs(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            governance: GovernanceParams::default(),
            retry: RetryPolicy::default(),
            resubscribe: default_resubscribe(),
            max_concurrent: default_max_concurrent(),
            enable_metrics: false,
        }
    }
}
