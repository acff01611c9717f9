use std::sync::Arc;

use tokio::sync::mpsc;

use wlagent_common::types::WorkloadType;
use wlagent_common::usage::codes;
use wlagent_config::Configuration;
use wlagent_discovery::DiscoveryMessage;
use wlagent_metrics::redis as redis_metrics;
use wlagent_metrics::redis_driver::RedisConnect;

use super::{DatabaseService, ServiceDeps, ServiceParams};

pub const PROCESS_PREFIXES: &[&str] = &["redis-server"];

fn params() -> ServiceParams {
    ServiceParams {
        workload: WorkloadType::Redis,
        name: "Redis Service",
        error_code: codes::REDIS_SERVICE_ERROR,
        discovery_error_code: codes::REDIS_DISCOVERY_FAILURE,
        collection_error_code: codes::REDIS_METRIC_COLLECTION_FAILURE,
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
    let section = &config.redis_configuration;
    let collector = redis_metrics::collector(section, Arc::new(RedisConnect), deps.secrets.clone());
    DatabaseService::new(
        params(),
        section.clone(),
        Box::new(collector),
        deps.clone(),
        receiver,
    )
}
