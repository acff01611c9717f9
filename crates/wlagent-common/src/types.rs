use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The database workloads the agent knows how to monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkloadType {
    Oracle,
    Mysql,
    Postgres,
    Redis,
    Mongodb,
    Sqlserver,
    Unknown,
}

impl std::fmt::Display for WorkloadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkloadType::Oracle => write!(f, "ORACLE"),
            WorkloadType::Mysql => write!(f, "MYSQL"),
            WorkloadType::Postgres => write!(f, "POSTGRES"),
            WorkloadType::Redis => write!(f, "REDIS"),
            WorkloadType::Mongodb => write!(f, "MONGODB"),
            WorkloadType::Sqlserver => write!(f, "SQLSERVER"),
            WorkloadType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl std::str::FromStr for WorkloadType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ORACLE" => Ok(WorkloadType::Oracle),
            "MYSQL" => Ok(WorkloadType::Mysql),
            "POSTGRES" | "POSTGRESQL" => Ok(WorkloadType::Postgres),
            "REDIS" => Ok(WorkloadType::Redis),
            "MONGODB" => Ok(WorkloadType::Mongodb),
            "SQLSERVER" => Ok(WorkloadType::Sqlserver),
            "UNKNOWN" => Ok(WorkloadType::Unknown),
            _ => Err(format!("unknown workload type: {s}")),
        }
    }
}

/// One batch of collected metrics for a single workload.
///
/// Values are stringified; keys are unique within a batch. This is the unit
/// the insight shipper sends to the data warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadMetrics {
    pub workload_type: WorkloadType,
    pub metrics: HashMap<String, String>,
}

/// Host identity injected once at startup and treated as read-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudProperties {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub numeric_project_id: String,
    #[serde(default)]
    pub instance_id: String,
    #[serde(default)]
    pub instance_name: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub machine_type: String,
    #[serde(default)]
    pub image: String,
}

/// How a metric column is interpreted by the collection engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetricType {
    /// Attached to the row's label set instead of emitted as a point.
    Label,
    Gauge,
    Cumulative,
}

/// Declared type a result column is scanned as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValueType {
    String,
    Int64,
    Double,
    Bool,
}

/// Value normalization applied before a column is emitted.
///
/// The engine itself holds no unit knowledge; whatever conversion a raw
/// reading needs is declared here, on the column, in the query table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    /// Parse strings like `"80MB"` / `"64kB"` / `"4GB"` into integer bytes.
    MemSizeBytes,
}

/// Which instance role a query may run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DatabaseRole {
    Primary,
    Standby,
    Both,
}

/// The role a connected instance currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceRole {
    Primary,
    Standby,
}

impl DatabaseRole {
    /// Whether a query declared with this role runs against `role`.
    pub fn matches(self, role: InstanceRole) -> bool {
        match self {
            DatabaseRole::Both => true,
            DatabaseRole::Primary => role == InstanceRole::Primary,
            DatabaseRole::Standby => role == InstanceRole::Standby,
        }
    }
}

impl std::fmt::Display for InstanceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceRole::Primary => write!(f, "primary"),
            InstanceRole::Standby => write!(f, "standby"),
        }
    }
}

/// One column of a declarative query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub source_name: String,
    /// Metric key override; falls back to `source_name`.
    #[serde(default)]
    pub output_name: Option<String>,
    pub metric_type: MetricType,
    pub value_type: ValueType,
    #[serde(default)]
    pub transform: Option<Transform>,
}

impl ColumnSpec {
    pub fn output_key(&self) -> &str {
        self.output_name.as_deref().unwrap_or(&self.source_name)
    }
}

/// A declarative query executed by the collection engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub name: String,
    pub sql: String,
    #[serde(default = "default_role")]
    pub database_role: DatabaseRole,
    pub columns: Vec<ColumnSpec>,
}

fn default_role() -> DatabaseRole {
    DatabaseRole::Both
}

/// A single time-series point produced by the collection engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub name: String,
    pub metric_type: MetricType,
    pub value: f64,
    pub labels: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}
