//! Time-series shipping.
//!
//! Points arrive already normalized from the collection engine; this shipper
//! only packages and sends them. Cumulative values pass through untouched:
//! rewriting them would break their monotonicity contract.

use std::sync::Arc;

use wlagent_cloud::types::{TimeSeriesEntry, WriteTimeSeriesRequest};
use wlagent_cloud::TimeSeriesWriter;
use wlagent_common::types::{MetricPoint, MetricType};
use wlagent_common::usage::{codes, UsageEvent, UsageSink};

fn kind_tag(metric_type: MetricType) -> &'static str {
    match metric_type {
        MetricType::Gauge => "GAUGE",
        MetricType::Cumulative => "CUMULATIVE",
        MetricType::Label => "LABEL",
    }
}

pub struct TimeSeriesShipper {
    writer: Arc<dyn TimeSeriesWriter>,
    project_id: String,
    usage: Arc<dyn UsageSink>,
}

impl TimeSeriesShipper {
    pub fn new(
        writer: Arc<dyn TimeSeriesWriter>,
        project_id: String,
        usage: Arc<dyn UsageSink>,
    ) -> Self {
        Self {
            writer,
            project_id,
            usage,
        }
    }

    /// Ships a tick's points in one request. Failures are reported but never
    /// escalate past the tick.
    pub async fn send_points(&self, points: Vec<MetricPoint>) -> bool {
        if points.is_empty() {
            return true;
        }
        let request = WriteTimeSeriesRequest {
            series: points
                .into_iter()
                .map(|p| TimeSeriesEntry {
                    metric: p.name,
                    kind: kind_tag(p.metric_type).to_string(),
                    value: p.value,
                    labels: p.labels,
                    timestamp: p.timestamp,
                })
                .collect(),
        };
        match self.writer.write_time_series(&self.project_id, &request).await {
            Ok(()) => {
                tracing::debug!(series = request.series.len(), "sent time series");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to send time series");
                self.usage
                    .record(UsageEvent::Error(codes::TIME_SERIES_WRITE_FAILURE));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use wlagent_cloud::CloudError;
    use wlagent_common::usage::RecordingUsageSink;

    struct FakeMonitoring {
        fail: bool,
        requests: Mutex<Vec<WriteTimeSeriesRequest>>,
    }

    #[async_trait::async_trait]
    impl TimeSeriesWriter for FakeMonitoring {
        async fn write_time_series(
            &self,
            _project_id: &str,
            request: &WriteTimeSeriesRequest,
        ) -> Result<(), CloudError> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                Err(CloudError::HttpError {
                    endpoint: "monitoring",
                    status: 500,
                    body: "test-error".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn point(name: &str, value: f64) -> MetricPoint {
        MetricPoint {
            name: name.to_string(),
            metric_type: MetricType::Gauge,
            value,
            labels: Default::default(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn packages_points_into_one_request() {
        let monitoring = Arc::new(FakeMonitoring {
            fail: false,
            requests: Mutex::new(Vec::new()),
        });
        let shipper = TimeSeriesShipper::new(
            monitoring.clone(),
            "test-project".to_string(),
            Arc::new(RecordingUsageSink::default()),
        );

        assert!(shipper.send_points(vec![point("a", 1.0), point("b", 2.0)]).await);
        let requests = monitoring.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].series.len(), 2);
        assert_eq!(requests[0].series[0].kind, "GAUGE");
    }

    #[tokio::test]
    async fn empty_tick_sends_nothing() {
        let monitoring = Arc::new(FakeMonitoring {
            fail: false,
            requests: Mutex::new(Vec::new()),
        });
        let shipper = TimeSeriesShipper::new(
            monitoring.clone(),
            "test-project".to_string(),
            Arc::new(RecordingUsageSink::default()),
        );
        assert!(shipper.send_points(Vec::new()).await);
        assert!(monitoring.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failure_records_usage_metric() {
        let usage = Arc::new(RecordingUsageSink::default());
        let shipper = TimeSeriesShipper::new(
            Arc::new(FakeMonitoring {
                fail: true,
                requests: Mutex::new(Vec::new()),
            }),
            "test-project".to_string(),
            usage.clone(),
        );
        assert!(!shipper.send_points(vec![point("a", 1.0)]).await);
        assert_eq!(
            usage.events(),
            vec![UsageEvent::Error(codes::TIME_SERIES_WRITE_FAILURE)]
        );
    }
}
