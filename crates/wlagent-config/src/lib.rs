//! Agent configuration: a TOML document read once at startup and treated as
//! immutable for the life of the process.

use anyhow::Context;
use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use wlagent_common::types::{CloudProperties, Query, WorkloadType};

/// Default path of the agent configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/wlagent/configuration.toml";

/// Tri-state enable flag.
///
/// `Auto` (the unset state) means "enable the service once its workload is
/// observed in the host process table"; it is distinct from an explicit
/// `false`, which disables the service outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Toggle {
    Enabled,
    Disabled,
    #[default]
    Auto,
}

impl Toggle {
    pub fn is_enabled(self) -> bool {
        self == Toggle::Enabled
    }

    pub fn is_disabled(self) -> bool {
        self == Toggle::Disabled
    }
}

// In the file the flag is a plain bool; absence maps to Auto via Default.
impl<'de> Deserialize<'de> for Toggle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let explicit = bool::deserialize(deserializer)?;
        Ok(if explicit {
            Toggle::Enabled
        } else {
            Toggle::Disabled
        })
    }
}

impl Serialize for Toggle {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Toggle::Enabled => serializer.serialize_bool(true),
            Toggle::Disabled => serializer.serialize_bool(false),
            Toggle::Auto => serializer.serialize_none(),
        }
    }
}

fn toggle_is_auto(t: &Toggle) -> bool {
    *t == Toggle::Auto
}

/// Log verbosity accepted in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Reference to a secret held in the hosted secret store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretRef {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub secret_name: String,
}

impl SecretRef {
    /// A reference missing either field is treated as not configured.
    pub fn is_fully_specified(&self) -> bool {
        !self.project_id.is_empty() && !self.secret_name.is_empty()
    }
}

/// How a workload service connects to its database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionParameters {
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<SecretRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Per-workload database-identity discovery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_discovery_frequency_secs")]
    pub update_frequency_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            update_frequency_secs: default_discovery_frequency_secs(),
        }
    }
}

impl DiscoveryConfig {
    pub fn update_frequency(&self) -> Duration {
        Duration::from_secs(self.update_frequency_secs)
    }
}

/// Per-workload metric collection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_collection_frequency_secs")]
    pub collection_frequency_secs: u64,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    #[serde(default = "default_max_execution_threads")]
    pub max_execution_threads: usize,
    /// Declarative query table; empty means "use the built-in table".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<Query>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            collection_frequency_secs: default_collection_frequency_secs(),
            query_timeout_secs: default_query_timeout_secs(),
            max_execution_threads: default_max_execution_threads(),
            queries: Vec::new(),
        }
    }
}

impl MetricsConfig {
    pub fn collection_frequency(&self) -> Duration {
        Duration::from_secs(self.collection_frequency_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

/// Configuration block shared by every workload service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    #[serde(default, skip_serializing_if = "toggle_is_auto")]
    pub enabled: Toggle,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub connection_parameters: ConnectionParameters,
}

/// Process-discovery fan-out settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonDiscoveryConfig {
    #[serde(default = "default_common_discovery_frequency_secs")]
    pub collection_frequency_secs: u64,
}

impl Default for CommonDiscoveryConfig {
    fn default() -> Self {
        Self {
            collection_frequency_secs: default_common_discovery_frequency_secs(),
        }
    }
}

impl CommonDiscoveryConfig {
    pub fn collection_frequency(&self) -> Duration {
        Duration::from_secs(self.collection_frequency_secs)
    }
}

/// Top-level agent configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default = "default_true")]
    pub log_to_cloud: bool,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub cloud_properties: CloudProperties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_warehouse_endpoint: Option<String>,
    #[serde(default)]
    pub common_discovery: CommonDiscoveryConfig,

    #[serde(default)]
    pub oracle_configuration: WorkloadConfig,
    #[serde(default)]
    pub mysql_configuration: WorkloadConfig,
    #[serde(default)]
    pub postgres_configuration: WorkloadConfig,
    #[serde(default)]
    pub redis_configuration: WorkloadConfig,
    #[serde(default)]
    pub mongodb_configuration: WorkloadConfig,
    #[serde(default)]
    pub sqlserver_configuration: WorkloadConfig,
}

impl Configuration {
    /// Loads and validates the configuration file. Any failure here is fatal
    /// to agent startup.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parsing configuration file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration back to the file (used by `configure`).
    pub fn store(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self).context("serializing configuration")?;
        std::fs::write(path, content)
            .with_context(|| format!("writing configuration file {}", path.display()))?;
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.common_discovery.collection_frequency_secs == 0 {
            anyhow::bail!("common_discovery.collection_frequency_secs must be positive");
        }
        for (workload, cfg) in self.workloads() {
            if cfg.discovery.update_frequency_secs == 0 {
                anyhow::bail!("{workload}: discovery.update_frequency_secs must be positive");
            }
            if cfg.metrics.collection_frequency_secs == 0 {
                anyhow::bail!("{workload}: metrics.collection_frequency_secs must be positive");
            }
            if cfg.metrics.query_timeout_secs == 0 {
                anyhow::bail!("{workload}: metrics.query_timeout_secs must be positive");
            }
        }
        Ok(())
    }

    /// All per-workload sections, keyed by workload type.
    pub fn workloads(&self) -> [(WorkloadType, &WorkloadConfig); 6] {
        [
            (WorkloadType::Oracle, &self.oracle_configuration),
            (WorkloadType::Mysql, &self.mysql_configuration),
            (WorkloadType::Postgres, &self.postgres_configuration),
            (WorkloadType::Redis, &self.redis_configuration),
            (WorkloadType::Mongodb, &self.mongodb_configuration),
            (WorkloadType::Sqlserver, &self.sqlserver_configuration),
        ]
    }

    pub fn workload(&self, workload: WorkloadType) -> Option<&WorkloadConfig> {
        match workload {
            WorkloadType::Oracle => Some(&self.oracle_configuration),
            WorkloadType::Mysql => Some(&self.mysql_configuration),
            WorkloadType::Postgres => Some(&self.postgres_configuration),
            WorkloadType::Redis => Some(&self.redis_configuration),
            WorkloadType::Mongodb => Some(&self.mongodb_configuration),
            WorkloadType::Sqlserver => Some(&self.sqlserver_configuration),
            WorkloadType::Unknown => None,
        }
    }

    pub fn workload_mut(&mut self, workload: WorkloadType) -> Option<&mut WorkloadConfig> {
        match workload {
            WorkloadType::Oracle => Some(&mut self.oracle_configuration),
            WorkloadType::Mysql => Some(&mut self.mysql_configuration),
            WorkloadType::Postgres => Some(&mut self.postgres_configuration),
            WorkloadType::Redis => Some(&mut self.redis_configuration),
            WorkloadType::Mongodb => Some(&mut self.mongodb_configuration),
            WorkloadType::Sqlserver => Some(&mut self.sqlserver_configuration),
            WorkloadType::Unknown => None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_discovery_frequency_secs() -> u64 {
    3600
}

fn default_collection_frequency_secs() -> u64 {
    300
}

fn default_query_timeout_secs() -> u64 {
    10
}

fn default_max_execution_threads() -> usize {
    10
}

fn default_common_discovery_frequency_secs() -> u64 {
    3 * 3600
}
