/// Errors that can occur when calling a cloud endpoint.
#[derive(Debug, thiserror::Error)]
pub enum CloudError {
    /// Non-2xx status code from the endpoint.
    #[error("{endpoint} HTTP error: status={status}, body={body}")]
    HttpError {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    /// An underlying HTTP transport error from `reqwest`.
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// JSON serialization or deserialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The metadata server refused or returned an unusable token.
    #[error("access token fetch failed: {0}")]
    TokenFetch(String),

    /// Secret payload could not be decoded.
    #[error("secret payload decode failed: {0}")]
    SecretDecode(String),
}

/// Convenience alias so callers can write `error::Result<T>`.
pub type Result<T> = std::result::Result<T, CloudError>;
