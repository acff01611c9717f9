//! PostgreSQL metric collection.

use std::sync::Arc;
use std::time::Duration;

use wlagent_cloud::SecretFetcher;
use wlagent_common::types::{
    ColumnSpec, DatabaseRole, InstanceRole, MetricType, Query, Transform, ValueType, WorkloadType,
    WorkloadMetrics,
};
use wlagent_config::{ConnectionParameters, WorkloadConfig};

use crate::conn::{build_dsn, resolve_password, CellValue, Connect, DbConnection};
use crate::engine::run_query_table;
use crate::error::{MetricsError, Result};
use crate::{CollectionOutput, WorkloadCollector};

const RECOVERY_SQL: &str = "SELECT pg_is_in_recovery()";

const WORK_MEM_KEY: &str = "work_mem";

pub struct PostgresCollector {
    connection: ConnectionParameters,
    queries: Vec<Query>,
    query_timeout: Duration,
    max_execution_threads: usize,
    connect: Arc<dyn Connect>,
    secrets: Arc<dyn SecretFetcher>,
    db: Option<Box<dyn DbConnection>>,
}

impl PostgresCollector {
    pub fn new(
        config: &WorkloadConfig,
        connect: Arc<dyn Connect>,
        secrets: Arc<dyn SecretFetcher>,
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
            db: None,
        }
    }

    pub fn default_queries() -> Vec<Query> {
        vec![Query {
            name: "work_mem".to_string(),
            // The server reports a unit-suffixed string; the column's
            // transform turns it into bytes.
            sql: "SHOW work_mem".to_string(),
            database_role: DatabaseRole::Both,
            columns: vec![ColumnSpec {
                source_name: WORK_MEM_KEY.to_string(),
                output_name: None,
                metric_type: MetricType::Gauge,
                value_type: ValueType::String,
                transform: Some(Transform::MemSizeBytes),
            }],
        }]
    }

    fn db(&self) -> Result<&dyn DbConnection> {
        self.db
            .as_deref()
            .ok_or_else(|| MetricsError::Connection("init_db has not run".to_string()))
    }

    /// Standby while the server is in recovery; any probe failure counts as
    /// primary.
    async fn current_role(&self) -> InstanceRole {
        let db = match self.db() {
            Ok(db) => db,
            Err(_) => return InstanceRole::Primary,
        };
        match db.query(RECOVERY_SQL, &[ValueType::Bool]).await {
            Ok(rows) => match rows.first().and_then(|r| r.first()) {
                Some(CellValue::Bool(true)) => InstanceRole::Standby,
                _ => InstanceRole::Primary,
            },
            Err(e) => {
                tracing::debug!(error = %e, "recovery probe failed, assuming primary");
                InstanceRole::Primary
            }
        }
    }
}

#[async_trait::async_trait]
impl WorkloadCollector for PostgresCollector {
    fn workload_type(&self) -> WorkloadType {
        WorkloadType::Postgres
    }

    async fn init_db(&mut self) -> Result<()> {
        if self.db.is_some() {
            return Ok(());
        }
        let password = resolve_password(&self.connection, self.secrets.as_ref()).await?;
        let dsn = build_dsn("postgres", &self.connection, &password, 5432, "postgres");
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
                workload_type: WorkloadType::Postgres,
                metrics: output.metrics,
            },
            points: output.points,
        })
    }
}
