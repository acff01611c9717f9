//! Data-warehouse `WriteInsight` client.

use crate::error::{CloudError, Result};
use crate::metadata::AccessTokenProvider;
use crate::types::{WriteInsightRequest, WriteInsightResponse};
use crate::InsightWriter;

pub const DEFAULT_DATA_WAREHOUSE_URL: &str = "https://workloadmanager-datawarehouse.googleapis.com";

pub struct DataWarehouseClient {
    http: reqwest::Client,
    base_url: String,
    tokens: AccessTokenProvider,
}

impl DataWarehouseClient {
    /// `endpoint_override` comes from `data_warehouse_endpoint` in the config
    /// file; when absent the production endpoint is used.
    pub fn new(endpoint_override: Option<String>, tokens: AccessTokenProvider) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: endpoint_override.unwrap_or_else(|| DEFAULT_DATA_WAREHOUSE_URL.to_string()),
            tokens,
        }
    }
}

#[async_trait::async_trait]
impl InsightWriter for DataWarehouseClient {
    async fn write_insight(
        &self,
        project_id: &str,
        location: &str,
        request: &WriteInsightRequest,
    ) -> Result<Option<WriteInsightResponse>> {
        let token = self.tokens.token().await?;
        let url = format!(
            "{}/v1/projects/{}/locations/{}/insights:writeInsight",
            self.base_url, project_id, location
        );
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CloudError::HttpError {
                endpoint: "datawarehouse",
                status: status.as_u16(),
                body,
            });
        }
        // The warehouse may reply with an empty body; that is still success.
        Ok(response.json().await.ok())
    }
}
