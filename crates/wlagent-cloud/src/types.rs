//! Wire types for the data-warehouse and time-series endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Workload-type tag accepted by the data warehouse. Anything the warehouse
/// does not recognize must be sent as `WORKLOAD_TYPE_UNSPECIFIED`.
pub const WORKLOAD_TYPE_UNSPECIFIED: &str = "WORKLOAD_TYPE_UNSPECIFIED";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorsoValidation {
    pub workload_type: String,
    pub validation_details: HashMap<String, String>,
    pub project_id: String,
    pub instance_name: String,
    pub agent_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub instance_id: String,
    pub torso_validation: TorsoValidation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteInsightRequest {
    pub insight: Insight,
}

/// The warehouse's acknowledgement. The body carries nothing the agent acts
/// on; an absent body with a 2xx status is still a success.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteInsightResponse {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesEntry {
    pub metric: String,
    pub kind: String,
    pub value: f64,
    pub labels: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteTimeSeriesRequest {
    pub series: Vec<TimeSeriesEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_insight_request_shape() {
        let req = WriteInsightRequest {
            insight: Insight {
                instance_id: "1234".to_string(),
                torso_validation: TorsoValidation {
                    workload_type: "MYSQL".to_string(),
                    validation_details: HashMap::from([(
                        "buffer_pool_size".to_string(),
                        "134217728".to_string(),
                    )]),
                    project_id: "test-project".to_string(),
                    instance_name: "db-host-1".to_string(),
                    agent_version: "0.3.1".to_string(),
                },
            },
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["insight"]["instance_id"], "1234");
        assert_eq!(value["insight"]["torso_validation"]["workload_type"], "MYSQL");
        assert_eq!(
            value["insight"]["torso_validation"]["validation_details"]["buffer_pool_size"],
            "134217728"
        );
    }

    #[test]
    fn empty_response_body_deserializes() {
        let resp: WriteInsightResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.status.is_none());
    }
}
