//! Declarative query/metric collection engine and the per-workload
//! collectors built on it.

pub mod conn;
pub mod engine;
pub mod error;
pub mod generic;
pub mod mongodb;
pub mod mysql;
pub mod oracle;
pub mod postgres;
pub mod redis;
pub mod redis_driver;
pub mod sqlserver;
pub mod sqlx_driver;

pub use conn::{CellValue, Connect, DbConnection, Row};
pub use error::{MetricsError, Result};

use wlagent_common::types::{MetricPoint, WorkloadMetrics, WorkloadType};

/// What one collection tick produced: the stringified batch for the insight
/// shipper and the typed points for the time-series shipper.
#[derive(Debug)]
pub struct CollectionOutput {
    pub metrics: WorkloadMetrics,
    pub points: Vec<MetricPoint>,
}

/// One workload's metric collector.
///
/// `init_db` is lazy and idempotent: the first call opens and probes the
/// connection, later calls reuse it. A failed `init_db` leaves the collector
/// unconnected so the next tick retries from scratch.
#[async_trait::async_trait]
pub trait WorkloadCollector: Send + Sync {
    fn workload_type(&self) -> WorkloadType;
    async fn init_db(&mut self) -> Result<()>;
    async fn collect_once(&mut self) -> Result<CollectionOutput>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Mock seams shared by the collector tests.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use wlagent_cloud::{CloudError, SecretFetcher};
    use wlagent_common::types::ValueType;

    use crate::conn::{Connect, DbConnection, Row};
    use crate::error::{MetricsError, Result};

    /// Statement-keyed fake database.
    #[derive(Default)]
    pub struct MockDb {
        results: HashMap<String, std::result::Result<Vec<Row>, String>>,
        ping_error: Option<String>,
    }

    impl MockDb {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_rows(mut self, sql: &str, rows: Vec<Row>) -> Self {
            self.results.insert(sql.to_string(), Ok(rows));
            self
        }

        pub fn with_error(mut self, sql: &str, message: &str) -> Self {
            self.results.insert(sql.to_string(), Err(message.to_string()));
            self
        }

        pub fn with_ping_error(mut self, message: &str) -> Self {
            self.ping_error = Some(message.to_string());
            self
        }
    }

    #[async_trait::async_trait]
    impl DbConnection for MockDb {
        async fn query(&self, sql: &str, _types: &[ValueType]) -> Result<Vec<Row>> {
            match self.results.get(sql) {
                Some(Ok(rows)) => Ok(rows.clone()),
                Some(Err(message)) => Err(MetricsError::Query {
                    name: sql.to_string(),
                    message: message.clone(),
                }),
                None => Ok(Vec::new()),
            }
        }

        async fn ping(&self) -> Result<()> {
            match &self.ping_error {
                Some(message) => Err(MetricsError::Ping(message.clone())),
                None => Ok(()),
            }
        }
    }

    /// Hands out a prepared [`MockDb`] exactly once.
    pub struct MockConnect {
        db: Mutex<Option<MockDb>>,
    }

    impl From<MockDb> for MockConnect {
        fn from(db: MockDb) -> Self {
            Self {
                db: Mutex::new(Some(db)),
            }
        }
    }

    #[async_trait::async_trait]
    impl Connect for MockConnect {
        async fn connect(&self, _dsn: &str) -> Result<Box<dyn DbConnection>> {
            let db = self
                .db
                .lock()
                .unwrap()
                .take()
                .expect("mock connection already taken");
            Ok(Box::new(db))
        }
    }

    /// Secret store that always answers with the same value.
    pub struct StaticSecrets {
        value: String,
    }

    impl StaticSecrets {
        pub fn new(value: &str) -> Self {
            Self {
                value: value.to_string(),
            }
        }
    }

    #[async_trait::async_trait]
    impl SecretFetcher for StaticSecrets {
        async fn fetch(
            &self,
            _project_id: &str,
            _secret_name: &str,
        ) -> wlagent_cloud::Result<String> {
            Ok(self.value.clone())
        }
    }

    /// Secret store that always fails.
    pub struct FailingSecrets;

    #[async_trait::async_trait]
    impl SecretFetcher for FailingSecrets {
        async fn fetch(
            &self,
            _project_id: &str,
            _secret_name: &str,
        ) -> wlagent_cloud::Result<String> {
            Err(CloudError::TokenFetch("fake-error".to_string()))
        }
    }
}
