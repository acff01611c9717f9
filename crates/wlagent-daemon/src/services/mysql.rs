use std::sync::Arc;

use tokio::sync::mpsc;

use wlagent_common::types::WorkloadType;
use wlagent_common::usage::codes;
use wlagent_config::Configuration;
use wlagent_discovery::DiscoveryMessage;
use wlagent_metrics::mysql::{DnsResolver, MySqlCollector};
use wlagent_metrics::sqlx_driver::MySqlConnect;

use super::{DatabaseService, ServiceDeps, ServiceParams};

pub const PROCESS_PREFIXES: &[&str] = &["mysqld"];

fn params() -> ServiceParams {
    ServiceParams {
        workload: WorkloadType::Mysql,
        name: "MySQL Service",
        error_code: codes::MYSQL_SERVICE_ERROR,
        discovery_error_code: codes::MYSQL_DISCOVERY_FAILURE,
        collection_error_code: codes::MYSQL_METRIC_COLLECTION_FAILURE,
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
    let section = &config.mysql_configuration;
    let collector = MySqlCollector::new(
        section,
        Arc::new(MySqlConnect),
        deps.secrets.clone(),
        Arc::new(DnsResolver),
    );
    DatabaseService::new(
        params(),
        section.clone(),
        Box::new(collector),
        deps.clone(),
        receiver,
    )
}
