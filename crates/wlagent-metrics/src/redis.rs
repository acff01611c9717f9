//! Redis metric collection.
//!
//! The query table carries command lines instead of SQL; see
//! [`crate::redis_driver`] for how replies become rows.

use std::sync::Arc;

use wlagent_cloud::SecretFetcher;
use wlagent_common::types::{
    ColumnSpec, DatabaseRole, MetricType, Query, ValueType, WorkloadType,
};
use wlagent_config::{ConnectionParameters, WorkloadConfig};

use crate::conn::{CellValue, Connect};
use crate::generic::{CollectorProfile, GenericCollector, RoleProbe};

const DEFAULT_PORT: u16 = 6379;

fn build_dsn(params: &ConnectionParameters, password: &str) -> String {
    let host = params.host.as_deref().unwrap_or("localhost");
    let port = params.port.unwrap_or(DEFAULT_PORT);
    if password.is_empty() {
        format!("redis://{host}:{port}")
    } else {
        // Redis auth is password-first; the username is optional ACL syntax.
        format!("redis://{}:{}@{}:{}", params.username, password, host, port)
    }
}

fn is_standby(cell: &CellValue) -> bool {
    matches!(cell.as_str(), Some("slave") | Some("replica"))
}

const PROFILE: CollectorProfile = CollectorProfile {
    workload: WorkloadType::Redis,
    build_dsn,
    role_probe: Some(RoleProbe {
        sql: "ROLE",
        value_type: ValueType::String,
        is_standby,
    }),
};

pub fn default_queries() -> Vec<Query> {
    vec![
        Query {
            name: "maxmemory".to_string(),
            sql: "CONFIG GET maxmemory".to_string(),
            database_role: DatabaseRole::Both,
            columns: vec![ColumnSpec {
                source_name: "maxmemory".to_string(),
                output_name: None,
                metric_type: MetricType::Gauge,
                value_type: ValueType::Int64,
                transform: None,
            }],
        },
        Query {
            name: "persistence".to_string(),
            sql: "CONFIG GET appendonly".to_string(),
            database_role: DatabaseRole::Both,
            columns: vec![ColumnSpec {
                source_name: "appendonly".to_string(),
                output_name: None,
                metric_type: MetricType::Label,
                value_type: ValueType::String,
                transform: None,
            }],
        },
        Query {
            name: "keyspace_size".to_string(),
            sql: "DBSIZE".to_string(),
            database_role: DatabaseRole::Primary,
            columns: vec![ColumnSpec {
                source_name: "keyspace_size".to_string(),
                output_name: None,
                metric_type: MetricType::Gauge,
                value_type: ValueType::Int64,
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
