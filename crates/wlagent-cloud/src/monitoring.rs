//! Time-series ingest client.

use crate::error::{CloudError, Result};
use crate::metadata::AccessTokenProvider;
use crate::types::WriteTimeSeriesRequest;
use crate::TimeSeriesWriter;

pub const DEFAULT_MONITORING_URL: &str = "https://monitoring.googleapis.com";

pub struct TimeSeriesClient {
    http: reqwest::Client,
    base_url: String,
    tokens: AccessTokenProvider,
}

impl TimeSeriesClient {
    pub fn new(tokens: AccessTokenProvider) -> Self {
        Self::with_base_url(DEFAULT_MONITORING_URL.to_string(), tokens)
    }

    pub fn with_base_url(base_url: String, tokens: AccessTokenProvider) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            tokens,
        }
    }
}

#[async_trait::async_trait]
impl TimeSeriesWriter for TimeSeriesClient {
    async fn write_time_series(
        &self,
        project_id: &str,
        request: &WriteTimeSeriesRequest,
    ) -> Result<()> {
        let token = self.tokens.token().await?;
        let url = format!("{}/v3/projects/{}/timeSeries", self.base_url, project_id);
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
                endpoint: "monitoring",
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
