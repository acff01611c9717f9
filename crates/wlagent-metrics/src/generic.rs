//! Table-driven collector shared by the workloads whose behavior is fully
//! described by a profile: how to build a DSN, how to probe the instance
//! role, and which query table to run.

use std::sync::Arc;
use std::time::Duration;

use wlagent_cloud::SecretFetcher;
use wlagent_common::types::{InstanceRole, Query, ValueType, WorkloadMetrics, WorkloadType};
use wlagent_config::{ConnectionParameters, WorkloadConfig};

use crate::conn::{resolve_password, CellValue, Connect, DbConnection};
use crate::engine::run_query_table;
use crate::error::{MetricsError, Result};
use crate::{CollectionOutput, WorkloadCollector};

/// Instance-role probe: a statement whose first result cell identifies a
/// standby. No rows, or a failed probe, count as primary.
#[derive(Clone, Copy)]
pub struct RoleProbe {
    pub sql: &'static str,
    pub value_type: ValueType,
    pub is_standby: fn(&CellValue) -> bool,
}

/// Everything that distinguishes one workload's collector from another's.
#[derive(Clone, Copy)]
pub struct CollectorProfile {
    pub workload: WorkloadType,
    pub build_dsn: fn(&ConnectionParameters, &str) -> String,
    pub role_probe: Option<RoleProbe>,
}

pub struct GenericCollector {
    profile: CollectorProfile,
    connection: ConnectionParameters,
    queries: Vec<Query>,
    query_timeout: Duration,
    max_execution_threads: usize,
    connect: Arc<dyn Connect>,
    secrets: Arc<dyn SecretFetcher>,
    db: Option<Box<dyn DbConnection>>,
}

impl GenericCollector {
    pub fn new(
        profile: CollectorProfile,
        config: &WorkloadConfig,
        default_queries: Vec<Query>,
        connect: Arc<dyn Connect>,
        secrets: Arc<dyn SecretFetcher>,
    ) -> Self {
        let queries = if config.metrics.queries.is_empty() {
            default_queries
        } else {
            config.metrics.queries.clone()
        };
        Self {
            profile,
            connection: config.connection_parameters.clone(),
            queries,
            query_timeout: config.metrics.query_timeout(),
            max_execution_threads: config.metrics.max_execution_threads,
            connect,
            secrets,
            db: None,
        }
    }

    fn db(&self) -> Result<&dyn DbConnection> {
        self.db
            .as_deref()
            .ok_or_else(|| MetricsError::Connection("init_db has not run".to_string()))
    }

    async fn current_role(&self) -> InstanceRole {
        let Some(probe) = self.profile.role_probe else {
            return InstanceRole::Primary;
        };
        let db = match self.db() {
            Ok(db) => db,
            Err(_) => return InstanceRole::Primary,
        };
        match db.query(probe.sql, &[probe.value_type]).await {
            Ok(rows) => match rows.first().and_then(|r| r.first()) {
                Some(cell) if (probe.is_standby)(cell) => InstanceRole::Standby,
                _ => InstanceRole::Primary,
            },
            Err(e) => {
                tracing::debug!(workload = %self.profile.workload, error = %e, "role probe failed, assuming primary");
                InstanceRole::Primary
            }
        }
    }
}

#[async_trait::async_trait]
impl WorkloadCollector for GenericCollector {
    fn workload_type(&self) -> WorkloadType {
        self.profile.workload
    }

    async fn init_db(&mut self) -> Result<()> {
        if self.db.is_some() {
            return Ok(());
        }
        let password = resolve_password(&self.connection, self.secrets.as_ref()).await?;
        let dsn = (self.profile.build_dsn)(&self.connection, &password);
        let db = self.connect.connect(&dsn).await?;
        db.ping().await?;
        self.db = Some(db);
        Ok(())
    }

    async fn collect_once(&mut self) -> Result<CollectionOutput> {
        let role = self.current_role().await;
        let output = run_query_table(
            self.db()?,
            &self.queries,
            role,
            self.query_timeout,
            self.max_execution_threads,
        )
        .await;
        if output.metrics.is_empty() && output.failed_queries > 0 {
            return Err(MetricsError::Empty);
        }
        Ok(CollectionOutput {
            metrics: WorkloadMetrics {
                workload_type: self.profile.workload,
                metrics: output.metrics,
            },
            points: output.points,
        })
    }
}

/// Stand-in connector for workloads whose wire driver is not bundled with
/// the agent. `init_db` fails with a connection-class error and the metric
/// loop retries next tick, so wiring a real driver is purely additive.
pub struct UnwiredConnect(pub &'static str);

#[async_trait::async_trait]
impl Connect for UnwiredConnect {
    async fn connect(&self, _dsn: &str) -> Result<Box<dyn DbConnection>> {
        Err(MetricsError::NoConnector(self.0))
    }
}
