//! MySQL metric collection.
//!
//! Beyond its declarative query table, MySQL carries a handful of metrics the
//! table cannot express: the InnoDB default-engine check inspects the shape
//! of `SHOW ENGINES` rows, the replication topology needs DNS work, and total
//! host RAM comes from the host rather than the server.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use sysinfo::System;
use wlagent_cloud::SecretFetcher;
use wlagent_common::types::{
    ColumnSpec, DatabaseRole, InstanceRole, MetricPoint, MetricType, Query, ValueType, WorkloadType,
};
use wlagent_config::{ConnectionParameters, WorkloadConfig};

use crate::conn::{build_dsn, resolve_password, Connect, DbConnection};
use crate::engine::run_query_table;
use crate::error::{MetricsError, Result};
use crate::{CollectionOutput, WorkloadCollector};

const REPLICA_STATUS_SQL: &str = "SHOW REPLICA STATUS";
const SLAVE_STATUS_SQL: &str = "SHOW SLAVE STATUS";
const ENGINES_SQL: &str = "SHOW ENGINES";
const REPLICATION_ZONES_SQL: &str =
    "SELECT host FROM information_schema.processlist WHERE command = 'Binlog Dump'";

const BUFFER_POOL_KEY: &str = "buffer_pool_size";
const CURRENT_ROLE_KEY: &str = "current_role";
const TOTAL_RAM_KEY: &str = "total_ram";
const INNODB_KEY: &str = "innodb";
const REPLICATION_ZONES_KEY: &str = "replication_zones";

/// Role names as the warehouse expects them for MySQL.
const SOURCE_ROLE: &str = "source";
const REPLICA_ROLE: &str = "replica";

/// Forward and reverse DNS, behind a trait so tests stay off the network.
pub trait NameResolver: Send + Sync {
    fn lookup_addr(&self, ip: IpAddr) -> std::io::Result<String>;
    fn lookup_host(&self, host: &str) -> std::io::Result<Vec<IpAddr>>;
}

/// System resolver.
#[derive(Debug, Default)]
pub struct DnsResolver;

impl NameResolver for DnsResolver {
    fn lookup_addr(&self, ip: IpAddr) -> std::io::Result<String> {
        dns_lookup::lookup_addr(&ip)
    }

    fn lookup_host(&self, host: &str) -> std::io::Result<Vec<IpAddr>> {
        dns_lookup::lookup_host(host)
    }
}

/// The zone tag is the second dotted component of an instance FQDN, e.g.
/// `host.us-central1-a.c.proj.internal.` -> `us-central1-a`.
fn zone_from_fqdn(fqdn: &str) -> Option<String> {
    let second = fqdn.split('.').nth(1)?;
    if second.is_empty() {
        return None;
    }
    Some(second.to_string())
}

pub struct MySqlCollector {
    connection: ConnectionParameters,
    queries: Vec<Query>,
    query_timeout: Duration,
    max_execution_threads: usize,
    connect: Arc<dyn Connect>,
    secrets: Arc<dyn SecretFetcher>,
    resolver: Arc<dyn NameResolver>,
    db: Option<Box<dyn DbConnection>>,
}

impl MySqlCollector {
    pub fn new(
        config: &WorkloadConfig,
        connect: Arc<dyn Connect>,
        secrets: Arc<dyn SecretFetcher>,
        resolver: Arc<dyn NameResolver>,
    ) -> Self {
        let queries = if config.metrics.queries.is_empty() {
            Self::default_queries()
        } else {
            config.metrics.queries.clone()
        };
        Self {
            connection: config.connection_parameters.clone(),
            queries,
            query_timeout: config.metrics.query_timeout(),
            max_execution_threads: config.metrics.max_execution_threads,
            connect,
            secrets,
            resolver,
            db: None,
        }
    }

    pub fn default_queries() -> Vec<Query> {
        vec![Query {
            name: "buffer_pool_size".to_string(),
            sql: "SELECT @@innodb_buffer_pool_size".to_string(),
            database_role: DatabaseRole::Both,
            columns: vec![ColumnSpec {
                source_name: BUFFER_POOL_KEY.to_string(),
                output_name: None,
                metric_type: MetricType::Gauge,
                value_type: ValueType::Int64,
                transform: None,
            }],
        }]
    }

    fn db(&self) -> Result<&dyn DbConnection> {
        self.db
            .as_deref()
            .ok_or_else(|| MetricsError::Connection("init_db has not run".to_string()))
    }

    /// Replica if `SHOW REPLICA STATUS` (or, on older servers, `SHOW SLAVE
    /// STATUS`) returns any row; source otherwise, including when both
    /// probes fail.
    async fn current_role(&self) -> InstanceRole {
        let db = match self.db() {
            Ok(db) => db,
            Err(_) => return InstanceRole::Primary,
        };
        match db.query(REPLICA_STATUS_SQL, &[]).await {
            Ok(rows) if !rows.is_empty() => return InstanceRole::Standby,
            Ok(_) => return InstanceRole::Primary,
            Err(e) => {
                tracing::debug!(error = %e, "SHOW REPLICA STATUS unavailable, trying SHOW SLAVE STATUS");
            }
        }
        match db.query(SLAVE_STATUS_SQL, &[]).await {
            Ok(rows) if !rows.is_empty() => InstanceRole::Standby,
            Ok(_) => InstanceRole::Primary,
            Err(e) => {
                tracing::debug!(error = %e, "SHOW SLAVE STATUS unavailable, assuming source");
                InstanceRole::Primary
            }
        }
    }

    /// True when the server's default storage engine is InnoDB.
    async fn is_innodb_default(&self) -> Result<bool> {
        let rows = self
            .db()?
            .query(ENGINES_SQL, &[ValueType::String, ValueType::String])
            .await?;
        for row in rows {
            let engine = row.first().and_then(|c| c.as_str()).unwrap_or_default();
            let support = row.get(1).and_then(|c| c.as_str()).unwrap_or_default();
            if engine == "InnoDB" && support == "DEFAULT" {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Zones of the currently connected replicas, deduplicated, in the order
    /// the server reported them. Only meaningful on a source.
    async fn replication_zones(&self, role: InstanceRole) -> Vec<String> {
        if role != InstanceRole::Primary {
            return Vec::new();
        }
        let rows = match self.db() {
            Ok(db) => match db.query(REPLICATION_ZONES_SQL, &[ValueType::String]).await {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::warn!(error = %e, "replica host listing failed");
                    return Vec::new();
                }
            },
            Err(_) => return Vec::new(),
        };

        let mut zones = Vec::new();
        for row in rows {
            let Some(host) = row.first().and_then(|c| c.as_str()) else {
                continue;
            };
            // processlist reports `host:port`.
            let address = match host.rsplit_once(':') {
                Some((bare, port)) if port.chars().all(|c| c.is_ascii_digit()) => bare,
                _ => host,
            };
            let Some(zone) = self.zone_for_address(address) else {
                continue;
            };
            if !zones.contains(&zone) {
                zones.push(zone);
            }
        }
        zones
    }

    fn zone_for_address(&self, address: &str) -> Option<String> {
        if let Ok(ip) = address.parse::<IpAddr>() {
            match self.resolver.lookup_addr(ip) {
                Ok(fqdn) => return zone_from_fqdn(&fqdn),
                Err(e) => {
                    tracing::warn!(address, error = %e, "reverse lookup failed, skipping replica");
                    return None;
                }
            }
        }
        // Not an IP: the entry is already a hostname. A forward lookup
        // validates it before we trust its zone component.
        match self.resolver.lookup_host(address) {
            Ok(_) => zone_from_fqdn(address),
            Err(e) => {
                tracing::warn!(address, error = %e, "forward lookup failed, skipping replica");
                None
            }
        }
    }
}

fn total_ram_bytes() -> u64 {
    let mut system = System::new();
    system.refresh_memory();
    system.total_memory()
}

#[async_trait::async_trait]
impl WorkloadCollector for MySqlCollector {
    fn workload_type(&self) -> WorkloadType {
        WorkloadType::Mysql
    }

    async fn init_db(&mut self) -> Result<()> {
        if self.db.is_some() {
            return Ok(());
        }
        let password = resolve_password(&self.connection, self.secrets.as_ref()).await?;
        let dsn = build_dsn("mysql", &self.connection, &password, 3306, "mysql");
        let db = self.connect.connect(&dsn).await?;
        db.ping().await?;
        self.db = Some(db);
        Ok(())
    }

    async fn collect_once(&mut self) -> Result<CollectionOutput> {
        let role = self.current_role().await;
        let mut output =
            run_query_table(
            self.db()?,
            &self.queries,
            role,
            self.query_timeout,
            self.max_execution_threads,
        )
        .await;

        match self.is_innodb_default().await {
            Ok(innodb) => {
                output.metrics.insert(INNODB_KEY.to_string(), innodb.to_string());
            }
            Err(e) => tracing::warn!(error = %e, "InnoDB engine check failed"),
        }

        let role_name = match role {
            InstanceRole::Primary => SOURCE_ROLE,
            InstanceRole::Standby => REPLICA_ROLE,
        };
        output
            .metrics
            .insert(CURRENT_ROLE_KEY.to_string(), role_name.to_string());

        let zones = self.replication_zones(role).await;
        output
            .metrics
            .insert(REPLICATION_ZONES_KEY.to_string(), zones.join(","));

        let ram = total_ram_bytes();
        output.metrics.insert(TOTAL_RAM_KEY.to_string(), ram.to_string());
        output.points.push(MetricPoint {
            name: TOTAL_RAM_KEY.to_string(),
            metric_type: MetricType::Gauge,
            value: ram as f64,
            labels: Default::default(),
            timestamp: chrono::Utc::now(),
        });

        Ok(CollectionOutput {
            metrics: wlagent_common::types::WorkloadMetrics {
                workload_type: WorkloadType::Mysql,
                metrics: output.metrics,
            },
            points: output.points,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::CellValue;
    use crate::testing::{MockConnect, MockDb, StaticSecrets};
    use std::collections::HashMap;

    #[derive(Default)]
    struct MockResolver {
        addr_names: HashMap<String, String>,
        host_fails: bool,
    }

    impl NameResolver for MockResolver {
        fn lookup_addr(&self, ip: IpAddr) -> std::io::Result<String> {
            self.addr_names
                .get(&ip.to_string())
                .cloned()
                .ok_or_else(|| std::io::Error::other("test-error"))
        }

        fn lookup_host(&self, _host: &str) -> std::io::Result<Vec<IpAddr>> {
            if self.host_fails {
                Err(std::io::Error::other("test-error"))
            } else {
                Ok(vec!["127.0.0.1".parse().unwrap()])
            }
        }
    }

    async fn collector(db: MockDb, resolver: MockResolver) -> MySqlCollector {
        let mut c = MySqlCollector::new(
            &WorkloadConfig::default(),
            Arc::new(MockConnect::from(db)),
            Arc::new(StaticSecrets::new("")),
            Arc::new(resolver),
        );
        c.init_db().await.unwrap();
        c
    }

    fn engines_row(engine: &str, support: &str) -> Vec<CellValue> {
        vec![
            CellValue::Str(engine.to_string()),
            CellValue::Str(support.to_string()),
            CellValue::Str("teststring3".to_string()),
        ]
    }

    #[tokio::test]
    async fn replica_status_row_means_replica() {
        let db = MockDb::new().with_rows(
            REPLICA_STATUS_SQL,
            vec![vec![CellValue::Str("anything".to_string())]],
        );
        let c = collector(db, MockResolver::default()).await;
        assert_eq!(c.current_role().await, InstanceRole::Standby);
    }

    #[tokio::test]
    async fn replica_status_error_falls_back_to_slave_status() {
        let db = MockDb::new()
            .with_error(REPLICA_STATUS_SQL, "test-error")
            .with_rows(SLAVE_STATUS_SQL, vec![vec![CellValue::Str("x".to_string())]]);
        let c = collector(db, MockResolver::default()).await;
        assert_eq!(c.current_role().await, InstanceRole::Standby);
    }

    #[tokio::test]
    async fn both_probes_failing_means_source() {
        let db = MockDb::new()
            .with_error(REPLICA_STATUS_SQL, "test-error")
            .with_error(SLAVE_STATUS_SQL, "test-error");
        let c = collector(db, MockResolver::default()).await;
        assert_eq!(c.current_role().await, InstanceRole::Primary);
    }

    #[tokio::test]
    async fn no_rows_means_source() {
        let db = MockDb::new().with_rows(REPLICA_STATUS_SQL, vec![]);
        let c = collector(db, MockResolver::default()).await;
        assert_eq!(c.current_role().await, InstanceRole::Primary);
    }

    #[tokio::test]
    async fn innodb_default_detection() {
        let db = MockDb::new().with_rows(ENGINES_SQL, vec![engines_row("InnoDB", "DEFAULT")]);
        assert!(collector(db, MockResolver::default()).await
            .is_innodb_default()
            .await
            .unwrap());

        let db = MockDb::new().with_rows(ENGINES_SQL, vec![engines_row("InnoDB", "YES")]);
        assert!(!collector(db, MockResolver::default()).await
            .is_innodb_default()
            .await
            .unwrap());

        let db = MockDb::new().with_rows(ENGINES_SQL, vec![engines_row("MyISAM", "DEFAULT")]);
        assert!(!collector(db, MockResolver::default()).await
            .is_innodb_default()
            .await
            .unwrap());

        let db = MockDb::new().with_rows(ENGINES_SQL, vec![]);
        assert!(!collector(db, MockResolver::default()).await
            .is_innodb_default()
            .await
            .unwrap());

        let db = MockDb::new().with_error(ENGINES_SQL, "test-error");
        assert!(collector(db, MockResolver::default()).await
            .is_innodb_default()
            .await
            .is_err());
    }

    #[test]
    fn zone_extraction_takes_the_second_component() {
        assert_eq!(
            zone_from_fqdn("host.us-central1-a.c.proj.internal.").unwrap(),
            "us-central1-a"
        );
        assert_eq!(
            zone_from_fqdn("testname.test-zone.c.fake-project.internal.").unwrap(),
            "test-zone"
        );
        assert!(zone_from_fqdn("bare").is_none());
    }

    #[tokio::test]
    async fn replication_zones_resolve_ips_via_reverse_dns() {
        let db = MockDb::new().with_rows(
            REPLICATION_ZONES_SQL,
            vec![
                vec![CellValue::Str("1.2.3.4:3306".to_string())],
                vec![CellValue::Str("5.6.7.8".to_string())],
            ],
        );
        let resolver = MockResolver {
            addr_names: HashMap::from([
                (
                    "1.2.3.4".to_string(),
                    "testname.test-zone.c.fake-project.internal.".to_string(),
                ),
                (
                    "5.6.7.8".to_string(),
                    "testname.test-zone2.c.fake-project.internal.".to_string(),
                ),
            ]),
            host_fails: false,
        };
        let c = collector(db, resolver).await;
        assert_eq!(
            c.replication_zones(InstanceRole::Primary).await,
            vec!["test-zone".to_string(), "test-zone2".to_string()]
        );
    }

    #[tokio::test]
    async fn replication_zones_accept_hostnames_directly() {
        let db = MockDb::new().with_rows(
            REPLICATION_ZONES_SQL,
            vec![vec![CellValue::Str(
                "testname.test-zone.c.fake-project.internal.".to_string(),
            )]],
        );
        let c = collector(db, MockResolver::default()).await;
        assert_eq!(
            c.replication_zones(InstanceRole::Primary).await,
            vec!["test-zone".to_string()]
        );
    }

    #[tokio::test]
    async fn unresolvable_replica_addresses_are_skipped() {
        let db = MockDb::new().with_rows(
            REPLICATION_ZONES_SQL,
            vec![vec![CellValue::Str("1.241234.3.4".to_string())]],
        );
        let resolver = MockResolver {
            addr_names: HashMap::new(),
            host_fails: true,
        };
        let c = collector(db, resolver).await;
        assert!(c.replication_zones(InstanceRole::Primary).await.is_empty());
    }

    #[tokio::test]
    async fn replicas_report_no_zones() {
        let db = MockDb::new().with_rows(
            REPLICATION_ZONES_SQL,
            vec![vec![CellValue::Str("1.2.3.4".to_string())]],
        );
        let c = collector(db, MockResolver::default()).await;
        assert!(c.replication_zones(InstanceRole::Standby).await.is_empty());
    }

    #[tokio::test]
    async fn collect_once_assembles_the_batch() {
        let db = MockDb::new()
            .with_rows(
                "SELECT @@innodb_buffer_pool_size",
                vec![vec![CellValue::Int(134217728)]],
            )
            .with_rows(ENGINES_SQL, vec![engines_row("InnoDB", "DEFAULT")])
            .with_rows(REPLICA_STATUS_SQL, vec![])
            .with_rows(REPLICATION_ZONES_SQL, vec![]);
        let mut c = collector(db, MockResolver::default()).await;

        let out = c.collect_once().await.unwrap();
        assert_eq!(out.metrics.workload_type, WorkloadType::Mysql);
        let m = &out.metrics.metrics;
        assert_eq!(m[BUFFER_POOL_KEY], "134217728");
        assert_eq!(m[CURRENT_ROLE_KEY], "source");
        assert_eq!(m[INNODB_KEY], "true");
        assert_eq!(m[REPLICATION_ZONES_KEY], "");
        assert!(m[TOTAL_RAM_KEY].parse::<u64>().is_ok());
        assert!(out.points.iter().any(|p| p.name == BUFFER_POOL_KEY));
    }

    #[tokio::test]
    async fn failed_buffer_pool_query_drops_only_that_key() {
        let db = MockDb::new()
            .with_error("SELECT @@innodb_buffer_pool_size", "test-error")
            .with_rows(ENGINES_SQL, vec![engines_row("InnoDB", "DEFAULT")])
            .with_rows(REPLICA_STATUS_SQL, vec![])
            .with_rows(REPLICATION_ZONES_SQL, vec![]);
        let mut c = collector(db, MockResolver::default()).await;

        let out = c.collect_once().await.unwrap();
        let m = &out.metrics.metrics;
        assert!(!m.contains_key(BUFFER_POOL_KEY));
        assert_eq!(m[CURRENT_ROLE_KEY], "source");
        assert_eq!(m[INNODB_KEY], "true");
    }
}
