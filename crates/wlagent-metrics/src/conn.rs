//! The connection seam between the collection engine and database drivers.
//!
//! The engine only ever talks to [`DbConnection`]; a [`Connect`] turns a data
//! source string into one. Wire drivers are external collaborators: sqlx and
//! redis implementations ship with this crate, anything else is injected.

use wlagent_cloud::SecretFetcher;
use wlagent_common::types::ValueType;
use wlagent_config::ConnectionParameters;

use crate::error::{MetricsError, Result};

/// One decoded result cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Str(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    Null,
}

impl CellValue {
    /// Numeric view used for time-series points.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(v) => Some(*v as f64),
            CellValue::Double(v) => Some(*v),
            CellValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            CellValue::Str(s) => s.trim().parse().ok(),
            CellValue::Null => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Str(s) => write!(f, "{s}"),
            CellValue::Int(v) => write!(f, "{v}"),
            CellValue::Double(v) => write!(f, "{v}"),
            CellValue::Bool(v) => write!(f, "{v}"),
            CellValue::Null => Ok(()),
        }
    }
}

pub type Row = Vec<CellValue>;

/// Re-types a raw cell to the column's declared value type.
pub fn coerce(cell: CellValue, value_type: ValueType) -> Result<CellValue> {
    let coerced = match (value_type, cell) {
        (_, CellValue::Null) => CellValue::Null,
        (ValueType::String, cell) => CellValue::Str(cell.to_string()),
        (ValueType::Int64, CellValue::Int(v)) => CellValue::Int(v),
        (ValueType::Int64, CellValue::Bool(v)) => CellValue::Int(v.into()),
        (ValueType::Int64, CellValue::Str(s)) => CellValue::Int(
            s.trim()
                .parse()
                .map_err(|_| MetricsError::Scan(format!("{s:?} is not an integer")))?,
        ),
        (ValueType::Int64, CellValue::Double(v)) => CellValue::Int(v as i64),
        (ValueType::Double, CellValue::Double(v)) => CellValue::Double(v),
        (ValueType::Double, CellValue::Int(v)) => CellValue::Double(v as f64),
        (ValueType::Double, CellValue::Str(s)) => CellValue::Double(
            s.trim()
                .parse()
                .map_err(|_| MetricsError::Scan(format!("{s:?} is not a number")))?,
        ),
        (ValueType::Double, CellValue::Bool(v)) => CellValue::Double(if v { 1.0 } else { 0.0 }),
        (ValueType::Bool, CellValue::Bool(v)) => CellValue::Bool(v),
        (ValueType::Bool, CellValue::Int(v)) => CellValue::Bool(v != 0),
        (ValueType::Bool, CellValue::Str(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => CellValue::Bool(true),
            "false" | "no" | "off" | "0" => CellValue::Bool(false),
            other => return Err(MetricsError::Scan(format!("{other:?} is not a bool"))),
        },
        (ValueType::Bool, CellValue::Double(v)) => CellValue::Bool(v != 0.0),
    };
    Ok(coerced)
}

/// A live connection to one database instance.
///
/// `types` declares how the first N result columns are decoded; columns
/// beyond the declared list are decoded as strings.
#[async_trait::async_trait]
pub trait DbConnection: Send + Sync {
    async fn query(&self, sql: &str, types: &[ValueType]) -> Result<Vec<Row>>;
    async fn ping(&self) -> Result<()>;
}

/// Opens a [`DbConnection`] from a data source string.
#[async_trait::async_trait]
pub trait Connect: Send + Sync {
    async fn connect(&self, dsn: &str) -> Result<Box<dyn DbConnection>>;
}

/// Resolves the connection password.
///
/// An inline config password wins. Otherwise a fully-specified secret
/// reference is fetched, and a fetch failure there is fatal to the caller's
/// `init_db`. A reference missing either field counts as "no secret
/// configured" and yields the empty password.
pub async fn resolve_password(
    params: &ConnectionParameters,
    secrets: &dyn SecretFetcher,
) -> Result<String> {
    if let Some(password) = &params.password {
        if !password.is_empty() {
            return Ok(password.clone());
        }
    }
    let Some(secret) = &params.secret else {
        return Ok(String::new());
    };
    if !secret.is_fully_specified() {
        return Ok(String::new());
    }
    let value = secrets
        .fetch(&secret.project_id, &secret.secret_name)
        .await?;
    Ok(value)
}

/// Builds a URL-style data source string for SQL drivers.
pub fn build_dsn(
    scheme: &str,
    params: &ConnectionParameters,
    password: &str,
    default_port: u16,
    default_database: &str,
) -> String {
    let host = params.host.as_deref().unwrap_or("localhost");
    let port = params.port.unwrap_or(default_port);
    let auth = if params.username.is_empty() {
        String::new()
    } else if password.is_empty() {
        format!("{}@", params.username)
    } else {
        format!("{}:{}@", params.username, password)
    };
    if default_database.is_empty() {
        format!("{scheme}://{auth}{host}:{port}")
    } else {
        format!("{scheme}://{auth}{host}:{port}/{default_database}")
    }
}
