use std::sync::Arc;

use tokio::sync::mpsc;

use wlagent_common::types::WorkloadType;
use wlagent_common::usage::codes;
use wlagent_config::Configuration;
use wlagent_discovery::DiscoveryMessage;
use wlagent_metrics::postgres::PostgresCollector;
use wlagent_metrics::sqlx_driver::PostgresConnect;

use super::{DatabaseService, ServiceDeps, ServiceParams};

pub const PROCESS_PREFIXES: &[&str] = &["postgres"];

fn params() -> ServiceParams {
    ServiceParams {
        workload: WorkloadType::Postgres,
        name: "Postgres Service",
        error_code: codes::POSTGRES_SERVICE_ERROR,
        discovery_error_code: codes::POSTGRES_DISCOVERY_FAILURE,
        collection_error_code: codes::POSTGRES_METRIC_COLLECTION_FAILURE,
        prefixes: PROCESS_PREFIXES,
        linux_only: false,
        identity: None,
    }
}

pub fn service(
    config: &Configuration,
    deps: &ServiceDeps,
    receiver: mpsc::Receiver<Arc<DiscoveryMessage>>,
) -> Arc<DatabaseService> {
    let section = &config.postgres_configuration;
    let collector = PostgresCollector::new(section, Arc::new(PostgresConnect), deps.secrets.clone());
    DatabaseService::new(
        params(),
        section.clone(),
        Box::new(collector),
        deps.clone(),
        receiver,
    )
}
