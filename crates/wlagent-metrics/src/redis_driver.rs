//! Redis-backed connection.
//!
//! Redis has no SQL, so the query table's `sql` field carries a command line
//! (`CONFIG GET maxmemory`, `ROLE`, ...). Replies are flattened into rows the
//! engine can bind like any other result set; `CONFIG GET` map replies keep
//! only the values, in parameter order, so a table column lines up with the
//! parameter it asked for.

use tokio::sync::Mutex;

use wlagent_common::types::ValueType;

use crate::conn::{coerce, CellValue, Connect, DbConnection, Row};
use crate::error::{MetricsError, Result};

#[derive(Debug, Default)]
pub struct RedisConnect;

#[async_trait::async_trait]
impl Connect for RedisConnect {
    async fn connect(&self, dsn: &str) -> Result<Box<dyn DbConnection>> {
        let client =
            redis::Client::open(dsn).map_err(|e| MetricsError::Connection(e.to_string()))?;
        let connection = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| MetricsError::Connection(e.to_string()))?;
        Ok(Box::new(RedisDb {
            connection: Mutex::new(connection),
        }))
    }
}

struct RedisDb {
    connection: Mutex<redis::aio::MultiplexedConnection>,
}

#[async_trait::async_trait]
impl DbConnection for RedisDb {
    async fn query(&self, sql: &str, types: &[ValueType]) -> Result<Vec<Row>> {
        let mut parts = sql.split_whitespace();
        let Some(first) = parts.next() else {
            return Err(MetricsError::Query {
                name: sql.to_string(),
                message: "empty command".to_string(),
            });
        };
        let mut command = redis::cmd(first);
        for part in parts {
            command.arg(part);
        }

        let value: redis::Value = {
            let mut connection = self.connection.lock().await;
            command
                .query_async(&mut *connection)
                .await
                .map_err(|e| MetricsError::Query {
                    name: sql.to_string(),
                    message: e.to_string(),
                })?
        };

        let is_config_get = sql.to_uppercase().starts_with("CONFIG GET");
        reply_to_rows(value, is_config_get, types)
    }

    async fn ping(&self) -> Result<()> {
        let mut connection = self.connection.lock().await;
        redis::cmd("PING")
            .query_async::<()>(&mut *connection)
            .await
            .map_err(|e| MetricsError::Ping(e.to_string()))
    }
}

fn scalar(value: redis::Value) -> Option<CellValue> {
    match value {
        redis::Value::Nil => Some(CellValue::Null),
        redis::Value::Int(v) => Some(CellValue::Int(v)),
        redis::Value::Double(v) => Some(CellValue::Double(v)),
        redis::Value::Boolean(v) => Some(CellValue::Bool(v)),
        redis::Value::SimpleString(s) => Some(CellValue::Str(s)),
        redis::Value::Okay => Some(CellValue::Str("OK".to_string())),
        redis::Value::BulkString(bytes) => {
            Some(CellValue::Str(String::from_utf8_lossy(&bytes).into_owned()))
        }
        _ => None,
    }
}

/// Flattens a reply into engine rows.
pub(crate) fn reply_to_rows(
    value: redis::Value,
    is_config_get: bool,
    types: &[ValueType],
) -> Result<Vec<Row>> {
    let cells: Vec<CellValue> = match value {
        redis::Value::Array(items) => items.into_iter().filter_map(scalar).collect(),
        redis::Value::Map(pairs) => pairs
            .into_iter()
            .filter_map(|(_, v)| scalar(v))
            .collect(),
        other => scalar(other).into_iter().collect(),
    };

    // CONFIG GET replies interleave parameter names with values.
    let cells: Vec<CellValue> = if is_config_get {
        cells.into_iter().skip(1).step_by(2).collect()
    } else {
        cells
    };

    let row: Row = cells
        .into_iter()
        .enumerate()
        .map(|(i, cell)| coerce(cell, types.get(i).copied().unwrap_or(ValueType::String)))
        .collect::<Result<_>>()?;
    Ok(vec![row])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_get_keeps_values_only() {
        let reply = redis::Value::Array(vec![
            redis::Value::BulkString(b"maxmemory".to_vec()),
            redis::Value::BulkString(b"1073741824".to_vec()),
        ]);
        let rows = reply_to_rows(reply, true, &[ValueType::Int64]).unwrap();
        assert_eq!(rows, vec![vec![CellValue::Int(1073741824)]]);
    }

    #[test]
    fn role_reply_flattens_scalars() {
        let reply = redis::Value::Array(vec![
            redis::Value::BulkString(b"master".to_vec()),
            redis::Value::Int(3129659),
            redis::Value::Array(vec![]),
        ]);
        let rows = reply_to_rows(reply, false, &[ValueType::String]).unwrap();
        assert_eq!(rows[0][0], CellValue::Str("master".to_string()));
    }

    #[test]
    fn scalar_reply_is_one_row() {
        let rows = reply_to_rows(redis::Value::Int(12), false, &[ValueType::Int64]).unwrap();
        assert_eq!(rows, vec![vec![CellValue::Int(12)]]);
    }
}
