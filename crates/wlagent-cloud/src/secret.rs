//! Secret-manager access.

use base64::Engine;
use serde::Deserialize;

use crate::error::{CloudError, Result};
use crate::metadata::AccessTokenProvider;
use crate::SecretFetcher;

pub const DEFAULT_SECRET_MANAGER_URL: &str = "https://secretmanager.googleapis.com";

#[derive(Debug, Deserialize)]
struct AccessSecretResponse {
    payload: SecretPayload,
}

#[derive(Debug, Deserialize)]
struct SecretPayload {
    data: String,
}

pub struct SecretManagerClient {
    http: reqwest::Client,
    base_url: String,
    tokens: AccessTokenProvider,
}

impl SecretManagerClient {
    pub fn new(tokens: AccessTokenProvider) -> Self {
        Self::with_base_url(DEFAULT_SECRET_MANAGER_URL.to_string(), tokens)
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
impl SecretFetcher for SecretManagerClient {
    async fn fetch(&self, project_id: &str, secret_name: &str) -> Result<String> {
        let token = self.tokens.token().await?;
        let url = format!(
            "{}/v1/projects/{}/secrets/{}/versions/latest:access",
            self.base_url, project_id, secret_name
        );
        let response = self.http.get(url).bearer_auth(token).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CloudError::HttpError {
                endpoint: "secretmanager",
                status: status.as_u16(),
                body,
            });
        }
        let parsed: AccessSecretResponse = response.json().await?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(parsed.payload.data.as_bytes())
            .map_err(|e| CloudError::SecretDecode(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| CloudError::SecretDecode(e.to_string()))
    }
}
