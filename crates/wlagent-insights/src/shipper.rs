//! Insight shipping.
//!
//! Every batch travels in its own task so one slow write never serializes a
//! tick; the caller's tick does not complete until all of them have joined,
//! so ticks never overlap themselves.

use std::sync::Arc;

use wlagent_cloud::types::{
    Insight, TorsoValidation, WriteInsightRequest, WORKLOAD_TYPE_UNSPECIFIED,
};
use wlagent_cloud::{CloudError, InsightWriter};
use wlagent_common::types::{CloudProperties, WorkloadMetrics, WorkloadType};
use wlagent_common::usage::{codes, UsageEvent, UsageSink};
use wlagent_common::AGENT_VERSION;

/// Fixed translation to the warehouse's workload-type tags. Anything the
/// mapping does not cover is sent as unspecified.
fn warehouse_workload_type(workload: WorkloadType) -> &'static str {
    match workload {
        WorkloadType::Oracle => "ORACLE",
        WorkloadType::Mysql => "MYSQL",
        WorkloadType::Postgres => "POSTGRES",
        WorkloadType::Redis => "REDIS",
        WorkloadType::Mongodb => "MONGODB",
        WorkloadType::Sqlserver => "SQLSERVER",
        WorkloadType::Unknown => WORKLOAD_TYPE_UNSPECIFIED,
    }
}

/// Builds the wire request for one batch.
pub fn create_write_insight_request(
    metrics: &WorkloadMetrics,
    cloud_props: &CloudProperties,
) -> WriteInsightRequest {
    WriteInsightRequest {
        insight: Insight {
            instance_id: cloud_props.instance_id.clone(),
            torso_validation: TorsoValidation {
                workload_type: warehouse_workload_type(metrics.workload_type).to_string(),
                validation_details: metrics.metrics.clone(),
                project_id: cloud_props.project_id.clone(),
                instance_name: cloud_props.instance_name.clone(),
                agent_version: AGENT_VERSION.to_string(),
            },
        },
    }
}

pub struct InsightShipper {
    writer: Arc<dyn InsightWriter>,
    cloud_props: CloudProperties,
    usage: Arc<dyn UsageSink>,
}

impl InsightShipper {
    pub fn new(
        writer: Arc<dyn InsightWriter>,
        cloud_props: CloudProperties,
        usage: Arc<dyn UsageSink>,
    ) -> Self {
        Self {
            writer,
            cloud_props,
            usage,
        }
    }

    /// Ships one batch. A missing response body with no error is success.
    pub async fn send_data_insight(&self, metrics: &WorkloadMetrics) -> Result<(), CloudError> {
        let request = create_write_insight_request(metrics, &self.cloud_props);
        match self
            .writer
            .write_insight(&self.cloud_props.project_id, &self.cloud_props.region, &request)
            .await
        {
            Ok(_) => {
                tracing::info!(workload_type = %metrics.workload_type, "sent metrics to data warehouse");
                Ok(())
            }
            Err(e) => {
                tracing::error!(workload_type = %metrics.workload_type, error = %e, "failed to send metrics to data warehouse");
                self.usage
                    .record(UsageEvent::Error(codes::DATA_WAREHOUSE_WRITE_INSIGHT_FAILURE));
                Err(e)
            }
        }
    }

    /// Ships a tick's batches concurrently and joins them all. Returns the
    /// number of batches that failed; the caller decides whether that fails
    /// the tick, never the loop.
    pub async fn send_metrics(self: Arc<Self>, batches: Vec<WorkloadMetrics>) -> usize {
        tracing::info!(batches = batches.len(), "sending metrics to data warehouse");
        let mut tasks = Vec::with_capacity(batches.len());
        for batch in batches {
            let shipper = Arc::clone(&self);
            tasks.push(tokio::spawn(async move {
                shipper.send_data_insight(&batch).await.is_err()
            }));
        }

        let mut failures = 0usize;
        for task in tasks {
            match task.await {
                Ok(true) => failures += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(error = %e, "insight shipping task panicked");
                    failures += 1;
                }
            }
        }
        failures
    }
}
