//! sqlx-backed connections for MySQL and PostgreSQL.

use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row as _;

use wlagent_common::types::ValueType;

use crate::conn::{CellValue, Connect, DbConnection, Row};
use crate::error::{MetricsError, Result};

const MAX_POOL_CONNECTIONS: u32 = 2;

/// Opens MySQL connections through a small sqlx pool.
#[derive(Debug, Default)]
pub struct MySqlConnect;

#[async_trait::async_trait]
impl Connect for MySqlConnect {
    async fn connect(&self, dsn: &str) -> Result<Box<dyn DbConnection>> {
        let pool = MySqlPoolOptions::new()
            .max_connections(MAX_POOL_CONNECTIONS)
            .connect(dsn)
            .await
            .map_err(|e| MetricsError::Connection(e.to_string()))?;
        Ok(Box::new(MySqlDb { pool }))
    }
}

struct MySqlDb {
    pool: MySqlPool,
}

#[async_trait::async_trait]
impl DbConnection for MySqlDb {
    async fn query(&self, sql: &str, types: &[ValueType]) -> Result<Vec<Row>> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MetricsError::Query {
                name: sql.to_string(),
                message: e.to_string(),
            })?;
        rows.iter().map(|row| decode_mysql_row(row, types)).collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| MetricsError::Ping(e.to_string()))
    }
}

fn decode_mysql_row(row: &MySqlRow, types: &[ValueType]) -> Result<Row> {
    (0..row.len())
        .map(|i| {
            let declared = types.get(i).copied().unwrap_or(ValueType::String);
            let cell = match declared {
                ValueType::String => row
                    .try_get::<Option<String>, _>(i)
                    .map(|v| v.map_or(CellValue::Null, CellValue::Str)),
                ValueType::Int64 => row
                    .try_get::<Option<i64>, _>(i)
                    .map(|v| v.map_or(CellValue::Null, CellValue::Int)),
                ValueType::Double => row
                    .try_get::<Option<f64>, _>(i)
                    .map(|v| v.map_or(CellValue::Null, CellValue::Double)),
                ValueType::Bool => row
                    .try_get::<Option<bool>, _>(i)
                    .map(|v| v.map_or(CellValue::Null, CellValue::Bool)),
            };
            cell.map_err(|e| MetricsError::Scan(e.to_string()))
        })
        .collect()
}

/// Opens PostgreSQL connections through a small sqlx pool.
#[derive(Debug, Default)]
pub struct PostgresConnect;

#[async_trait::async_trait]
impl Connect for PostgresConnect {
    async fn connect(&self, dsn: &str) -> Result<Box<dyn DbConnection>> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_POOL_CONNECTIONS)
            .connect(dsn)
            .await
            .map_err(|e| MetricsError::Connection(e.to_string()))?;
        Ok(Box::new(PostgresDb { pool }))
    }
}

struct PostgresDb {
    pool: PgPool,
}

#[async_trait::async_trait]
impl DbConnection for PostgresDb {
    async fn query(&self, sql: &str, types: &[ValueType]) -> Result<Vec<Row>> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MetricsError::Query {
                name: sql.to_string(),
                message: e.to_string(),
            })?;
        rows.iter().map(|row| decode_pg_row(row, types)).collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| MetricsError::Ping(e.to_string()))
    }
}

fn decode_pg_row(row: &PgRow, types: &[ValueType]) -> Result<Row> {
    (0..row.len())
        .map(|i| {
            let declared = types.get(i).copied().unwrap_or(ValueType::String);
            let cell = match declared {
                ValueType::String => row
                    .try_get::<Option<String>, _>(i)
                    .map(|v| v.map_or(CellValue::Null, CellValue::Str)),
                ValueType::Int64 => row
                    .try_get::<Option<i64>, _>(i)
                    .map(|v| v.map_or(CellValue::Null, CellValue::Int)),
                ValueType::Double => row
                    .try_get::<Option<f64>, _>(i)
                    .map(|v| v.map_or(CellValue::Null, CellValue::Double)),
                ValueType::Bool => row
                    .try_get::<Option<bool>, _>(i)
                    .map(|v| v.map_or(CellValue::Null, CellValue::Bool)),
            };
            cell.map_err(|e| MetricsError::Scan(e.to_string()))
        })
        .collect()
}
