use std::sync::Arc;

use tokio::sync::mpsc;

use wlagent_common::types::WorkloadType;
use wlagent_common::usage::codes;
use wlagent_config::Configuration;
use wlagent_discovery::DiscoveryMessage;
use wlagent_metrics::generic::UnwiredConnect;
use wlagent_metrics::oracle as oracle_metrics;

use super::{DatabaseService, ServiceDeps, ServiceParams};

fn params() -> ServiceParams {
    ServiceParams {
        workload: WorkloadType::Oracle,
        name: "Oracle Service",
        error_code: codes::ORACLE_SERVICE_ERROR,
        discovery_error_code: codes::ORACLE_DISCOVERY_FAILURE,
        collection_error_code: codes::ORACLE_METRIC_COLLECTION_FAILURE,
        prefixes: oracle_metrics::PMON_PREFIXES,
        // The Oracle client library only exists on Linux.
        linux_only: true,
        identity: Some(oracle_metrics::discover_sids),
    }
}

pub fn service(
    config: &Configuration,
    deps: &ServiceDeps,
    receiver: mpsc::Receiver<Arc<DiscoveryMessage>>,
) -> Arc<DatabaseService> {
    let section = &config.oracle_configuration;
    let collector = oracle_metrics::collector(
        section,
        Arc::new(UnwiredConnect("oracle")),
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
