//! Oracle metric collection and database-identity discovery.
//!
//! Oracle instances advertise themselves through their background monitor
//! processes: `ora_pmon_<SID>` (or `db_pmon_<SID>` on newer releases), so SID
//! discovery needs only the process table. Metric collection goes through the
//! connection seam like every other SQL workload; the Oracle client library
//! itself is Linux-only and injected.

use std::sync::Arc;

use wlagent_cloud::SecretFetcher;
use wlagent_common::types::{
    ColumnSpec, DatabaseRole, MetricType, Query, ValueType, WorkloadType,
};
use wlagent_config::{ConnectionParameters, WorkloadConfig};
use wlagent_discovery::ProcessHandle;

use crate::conn::{build_dsn as build_url, CellValue, Connect};
use crate::generic::{CollectorProfile, GenericCollector, RoleProbe};

/// Process-name prefixes that mark a running Oracle instance.
pub const PMON_PREFIXES: &[&str] = &["ora_pmon_", "db_pmon_"];

const DEFAULT_PORT: u16 = 1521;

fn build_dsn(params: &ConnectionParameters, password: &str) -> String {
    build_url("oracle", params, password, DEFAULT_PORT, "")
}

fn is_standby(cell: &CellValue) -> bool {
    cell.as_str().is_some_and(|role| role.contains("STANDBY"))
}

const PROFILE: CollectorProfile = CollectorProfile {
    workload: WorkloadType::Oracle,
    build_dsn,
    role_probe: Some(RoleProbe {
        sql: "SELECT database_role FROM v$database",
        value_type: ValueType::String,
        is_standby,
    }),
};

pub fn default_queries() -> Vec<Query> {
    vec![
        Query {
            name: "sga_max_size".to_string(),
            sql: "SELECT value FROM v$parameter WHERE name = 'sga_max_size'".to_string(),
            database_role: DatabaseRole::Both,
            columns: vec![ColumnSpec {
                source_name: "sga_max_size".to_string(),
                output_name: None,
                metric_type: MetricType::Gauge,
                value_type: ValueType::Int64,
                transform: None,
            }],
        },
        Query {
            name: "open_mode".to_string(),
            sql: "SELECT open_mode FROM v$database".to_string(),
            database_role: DatabaseRole::Both,
            columns: vec![ColumnSpec {
                source_name: "open_mode".to_string(),
                output_name: None,
                metric_type: MetricType::Label,
                value_type: ValueType::String,
                transform: None,
            }],
        },
    ]
}

pub fn collector(
    config: &WorkloadConfig,
    connect: Arc<dyn Connect>,
    secrets: Arc<dyn SecretFetcher>,
) -> GenericCollector {
    GenericCollector::new(PROFILE, config, default_queries(), connect, secrets)
}

/// SIDs of the Oracle instances currently running on this host, derived from
/// their pmon process names. Sorted and deduplicated.
pub fn discover_sids(processes: &[Arc<dyn ProcessHandle>]) -> Vec<String> {
    let mut sids: Vec<String> = Vec::new();
    for process in processes {
        let Ok(name) = process.name() else { continue };
        for prefix in PMON_PREFIXES {
            if let Some(sid) = name.strip_prefix(prefix) {
                if !sid.is_empty() && !sids.iter().any(|s| s == sid) {
                    sids.push(sid.to_string());
                }
            }
        }
    }
    sids.sort();
    sids
}
