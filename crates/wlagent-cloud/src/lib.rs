//! Cloud endpoint clients.
//!
//! Every outbound endpoint is reached through a trait so the rest of the
//! agent (and its tests) never needs a live network. The reqwest-backed
//! implementations live alongside the traits; each takes a base-URL override
//! for tests.

pub mod datawarehouse;
pub mod error;
pub mod metadata;
pub mod monitoring;
pub mod secret;
pub mod types;

pub use datawarehouse::DataWarehouseClient;
pub use error::{CloudError, Result};
pub use metadata::AccessTokenProvider;
pub use monitoring::TimeSeriesClient;
pub use secret::SecretManagerClient;

use types::{WriteInsightRequest, WriteInsightResponse, WriteTimeSeriesRequest};

/// Writes insight payloads to the data warehouse.
///
/// A `Ok(None)` return (no response body, no error) counts as success.
#[async_trait::async_trait]
pub trait InsightWriter: Send + Sync {
    async fn write_insight(
        &self,
        project_id: &str,
        location: &str,
        request: &WriteInsightRequest,
    ) -> Result<Option<WriteInsightResponse>>;
}

/// Writes metric points to the time-series endpoint.
#[async_trait::async_trait]
pub trait TimeSeriesWriter: Send + Sync {
    async fn write_time_series(
        &self,
        project_id: &str,
        request: &WriteTimeSeriesRequest,
    ) -> Result<()>;
}

/// Fetches the latest version of a named secret.
#[async_trait::async_trait]
pub trait SecretFetcher: Send + Sync {
    async fn fetch(&self, project_id: &str, secret_name: &str) -> Result<String>;
}
