//! Access-token retrieval from the instance metadata server.

use serde::Deserialize;

use crate::error::{CloudError, Result};

pub const DEFAULT_METADATA_URL: &str = "http://metadata.google.internal";

const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Fetches bearer tokens for outbound cloud calls.
pub struct AccessTokenProvider {
    http: reqwest::Client,
    base_url: String,
}

impl AccessTokenProvider {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_METADATA_URL.to_string())
    }

    /// Base-URL override, for pointing tests at a local server.
    pub fn with_base_url(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    pub async fn token(&self) -> Result<String> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, TOKEN_PATH))
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(CloudError::TokenFetch(format!(
                "metadata server returned {}",
                response.status()
            )));
        }
        let token: TokenResponse = response.json().await?;
        if token.access_token.is_empty() {
            return Err(CloudError::TokenFetch("empty access token".to_string()));
        }
        Ok(token.access_token)
    }
}

impl Default for AccessTokenProvider {
    fn default() -> Self {
        Self::new()
    }
}
