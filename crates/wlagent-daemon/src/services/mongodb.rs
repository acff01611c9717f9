use std::sync::Arc;

use tokio::sync::mpsc;

use wlagent_common::types::WorkloadType;
use wlagent_common::usage::codes;
use wlagent_config::Configuration;
use wlagent_discovery::DiscoveryMessage;
use wlagent_metrics::generic::UnwiredConnect;
use wlagent_metrics::mongodb as mongodb_metrics;

use super::{DatabaseService, ServiceDeps, ServiceParams};

pub const PROCESS_PREFIXES: &[&str] = &["mongod"];

fn params() -> ServiceParams {
    ServiceParams {
        workload: WorkloadType::Mongodb,
        name: "MongoDB Service",
        error_code: codes::MONGODB_SERVICE_ERROR,
        discovery_error_code: codes::MONGODB_DISCOVERY_FAILURE,
        collection_error_code: codes::MONGODB_METRIC_COLLECTION_FAILURE,
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
    let section = &config.mongodb_configuration;
    let collector = mongodb_metrics::collector(
        section,
        Arc::new(UnwiredConnect("mongodb")),
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
