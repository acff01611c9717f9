//! SQL Server metric collection.
//!
//! Like MongoDB, the wire driver is injected through the connection seam.

use std::sync::Arc;

use wlagent_cloud::SecretFetcher;
use wlagent_common::types::{
    ColumnSpec, DatabaseRole, MetricType, Query, ValueType, WorkloadType,
};
use wlagent_config::{ConnectionParameters, WorkloadConfig};

use crate::conn::{build_dsn as build_url, CellValue, Connect};
use crate::generic::{CollectorProfile, GenericCollector, RoleProbe};

const DEFAULT_PORT: u16 = 1433;

fn build_dsn(params: &ConnectionParameters, password: &str) -> String {
    build_url("sqlserver", params, password, DEFAULT_PORT, "")
}

fn is_standby(cell: &CellValue) -> bool {
    matches!(cell.as_str(), Some("SECONDARY"))
}

const PROFILE: CollectorProfile = CollectorProfile {
    workload: WorkloadType::Sqlserver,
    build_dsn,
    role_probe: Some(RoleProbe {
        sql: "SELECT role_desc FROM sys.dm_hadr_availability_replica_states WHERE is_local = 1",
        value_type: ValueType::String,
        is_standby,
    }),
};

pub fn default_queries() -> Vec<Query> {
    vec![
        Query {
            name: "cpu_count".to_string(),
            sql: "SELECT cpu_count FROM sys.dm_os_sys_info".to_string(),
            database_role: DatabaseRole::Both,
            columns: vec![ColumnSpec {
                source_name: "cpu_count".to_string(),
                output_name: None,
                metric_type: MetricType::Gauge,
                value_type: ValueType::Int64,
                transform: None,
            }],
        },
        Query {
            name: "product_version".to_string(),
            sql: "SELECT CAST(SERVERPROPERTY('ProductVersion') AS NVARCHAR(128)) AS product_version"
                .to_string(),
            database_role: DatabaseRole::Both,
            columns: vec![ColumnSpec {
                source_name: "product_version".to_string(),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockConnect, MockDb, StaticSecrets};
    use crate::WorkloadCollector;

    #[tokio::test]
    async fn collects_cpu_count_and_version() {
        let db = MockDb::new()
            .with_rows(PROFILE.role_probe.unwrap().sql, vec![])
            .with_rows(
                "SELECT cpu_count FROM sys.dm_os_sys_info",
                vec![vec![CellValue::Int(16)]],
            )
            .with_rows(
                "SELECT CAST(SERVERPROPERTY('ProductVersion') AS NVARCHAR(128)) AS product_version",
                vec![vec![CellValue::Str("16.0.1000.6".to_string())]],
            );
        let mut c = collector(
            &WorkloadConfig::default(),
            Arc::new(MockConnect::from(db)),
            Arc::new(StaticSecrets::new("")),
        );
        c.init_db().await.unwrap();

        let out = c.collect_once().await.unwrap();
        assert_eq!(out.metrics.workload_type, WorkloadType::Sqlserver);
        assert_eq!(out.metrics.metrics["cpu_count"], "16");
        assert_eq!(out.metrics.metrics["product_version"], "16.0.1000.6");
    }
}
