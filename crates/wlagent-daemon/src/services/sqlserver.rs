use std::sync::Arc;

use tokio::sync::mpsc;

use wlagent_common::types::WorkloadType;
use wlagent_common::usage::codes;
use wlagent_config::Configuration;
use wlagent_discovery::DiscoveryMessage;
use wlagent_metrics::generic::UnwiredConnect;
use wlagent_metrics::sqlserver as sqlserver_metrics;

use super::{DatabaseService, ServiceDeps, ServiceParams};

pub const PROCESS_PREFIXES: &[&str] = &["sqlservr"];

fn params() -> ServiceParams {
    ServiceParams {
        workload: WorkloadType::Sqlserver,
        name: "SQL Server Service",
        error_code: codes::SQLSERVER_SERVICE_ERROR,
        discovery_error_code: codes::SQLSERVER_DISCOVERY_FAILURE,
        collection_error_code: codes::SQLSERVER_METRIC_COLLECTION_FAILURE,
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
    let section = &config.sqlserver_configuration;
    let collector = sqlserver_metrics::collector(
        section,
        Arc::new(UnwiredConnect("sqlserver")),
        deps.secrets.clone(),
    );
    DatabaseService::new(
        params(),
        section.clone(),
        Box::new(collector),
        deps.clone(),
        receiver,
    )
}
