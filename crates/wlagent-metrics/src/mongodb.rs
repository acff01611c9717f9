//! MongoDB metric collection.
//!
//! The wire driver is an external collaborator injected through the
//! connection seam; the query table's `sql` field names server commands for
//! that driver to run.

use std::sync::Arc;

use wlagent_cloud::SecretFetcher;
use wlagent_common::types::{
    ColumnSpec, DatabaseRole, MetricType, Query, ValueType, WorkloadType,
};
use wlagent_config::{ConnectionParameters, WorkloadConfig};

use crate::conn::{build_dsn as build_url, CellValue, Connect};
use crate::generic::{CollectorProfile, GenericCollector, RoleProbe};

const DEFAULT_PORT: u16 = 27017;

fn build_dsn(params: &ConnectionParameters, password: &str) -> String {
    build_url("mongodb", params, password, DEFAULT_PORT, "")
}

fn is_standby(cell: &CellValue) -> bool {
    // The `hello` command reports isWritablePrimary.
    matches!(cell, CellValue::Bool(false))
}

const PROFILE: CollectorProfile = CollectorProfile {
    workload: WorkloadType::Mongodb,
    build_dsn,
    role_probe: Some(RoleProbe {
        sql: "hello",
        value_type: ValueType::Bool,
        is_standby,
    }),
};

pub fn default_queries() -> Vec<Query> {
    vec![
        Query {
            name: "server_version".to_string(),
            sql: "buildInfo".to_string(),
            database_role: DatabaseRole::Both,
            columns: vec![ColumnSpec {
                source_name: "version".to_string(),
                output_name: None,
                metric_type: MetricType::Label,
                value_type: ValueType::String,
                transform: None,
            }],
        },
        Query {
            name: "current_connections".to_string(),
            sql: "serverStatus.connections.current".to_string(),
            database_role: DatabaseRole::Both,
            columns: vec![ColumnSpec {
                source_name: "current_connections".to_string(),
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
