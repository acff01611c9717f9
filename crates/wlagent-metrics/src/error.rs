use wlagent_cloud::CloudError;

/// Failure classes of the metric collection engine.
///
/// Only `SecretFetch`, `Connection` and `Ping` abort an `init_db`; the rest
/// are absorbed at query or row granularity and the tick continues.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("database connection failed: {0}")]
    Connection(String),

    #[error("liveness probe failed: {0}")]
    Ping(String),

    #[error("no {0} driver wired for this collector")]
    NoConnector(&'static str),

    #[error("query {name} failed: {message}")]
    Query { name: String, message: String },

    #[error("query {query} exceeded its deadline")]
    Timeout { query: String },

    #[error("row scan failed: {0}")]
    Scan(String),

    #[error("no metrics collected this tick")]
    Empty,

    #[error("secret fetch failed: {0}")]
    SecretFetch(#[from] CloudError),
}

pub type Result<T> = std::result::Result<T, MetricsError>;
