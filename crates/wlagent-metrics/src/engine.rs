//! Declarative query interpreter.
//!
//! The engine walks a table of [`Query`] values, runs each one whose declared
//! role matches the connected instance, and turns result rows into labelled
//! metric points plus a flat stringified map for the insight payload. It is a
//! pure interpreter: any unit conversion a raw reading needs is declared on
//! the column, not coded here.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use wlagent_common::types::{InstanceRole, MetricPoint, MetricType, Query, Transform, ValueType};

use crate::conn::{coerce, CellValue, DbConnection, Row};
use crate::error::{MetricsError, Result};

/// Everything one pass over a query table produced.
#[derive(Debug, Default)]
pub struct EngineOutput {
    /// Stringified metric map destined for the insight payload.
    pub metrics: HashMap<String, String>,
    /// Typed points destined for the time-series endpoint.
    pub points: Vec<MetricPoint>,
    /// Queries that failed or timed out this pass.
    pub failed_queries: usize,
}

/// Runs every role-matching query in `queries` against `db`, at most
/// `max_execution_threads` in flight at once.
///
/// A query failure or timeout skips that query and moves on; a malformed row
/// skips that row. Neither aborts the pass.
pub async fn run_query_table<'a>(
    db: &'a dyn DbConnection,
    queries: &'a [Query],
    role: InstanceRole,
    query_timeout: Duration,
    max_execution_threads: usize,
) -> EngineOutput {
    let matching: Vec<&'a Query> = queries
        .iter()
        .filter(|q| q.database_role.matches(role))
        .collect();

    let futs: Vec<std::pin::Pin<Box<dyn std::future::Future<Output = (&'a Query, Result<Vec<Row>>)> + Send + 'a>>> =
        matching
            .into_iter()
            .map(|query| Box::pin(run_one(db, query, query_timeout)) as _)
            .collect();

    let results: Vec<(&Query, Result<Vec<Row>>)> = stream::iter(futs)
        .buffer_unordered(max_execution_threads.max(1))
        .collect()
        .await;

    let mut output = EngineOutput::default();
    for (query, result) in results {
        let rows = match result {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(query = %query.name, error = %e, "query failed");
                output.failed_queries += 1;
                continue;
            }
        };
        for row in rows {
            if let Err(e) = emit_row(query, &row, &mut output) {
                tracing::warn!(query = %query.name, error = %e, "dropping row");
            }
        }
    }

    output
}

async fn run_one<'a>(
    db: &'a dyn DbConnection,
    query: &'a Query,
    query_timeout: Duration,
) -> (&'a Query, Result<Vec<Row>>) {
    (query, execute_query(db, query, query_timeout).await)
}

async fn execute_query(
    db: &dyn DbConnection,
    query: &Query,
    query_timeout: Duration,
) -> Result<Vec<Row>> {
    let types: Vec<ValueType> = query.columns.iter().map(|c| c.value_type).collect();
    match tokio::time::timeout(query_timeout, db.query(&query.sql, &types)).await {
        Ok(result) => result,
        Err(_) => Err(MetricsError::Timeout {
            query: query.name.clone(),
        }),
    }
}

fn emit_row(query: &Query, row: &[CellValue], output: &mut EngineOutput) -> Result<()> {
    if row.len() < query.columns.len() {
        return Err(MetricsError::Scan(format!(
            "expected {} columns, got {}",
            query.columns.len(),
            row.len()
        )));
    }

    // Bind the whole row first so a scan failure drops it before anything
    // from it has been emitted.
    let cells: Vec<CellValue> = query
        .columns
        .iter()
        .zip(row)
        .map(|(spec, cell)| apply_transform(spec.transform, coerce(cell.clone(), spec.value_type)?))
        .collect::<Result<_>>()?;

    // Every metric column in the row carries the full label set.
    let mut labels = HashMap::new();
    for (spec, cell) in query.columns.iter().zip(&cells) {
        if spec.metric_type == MetricType::Label {
            labels.insert(spec.output_key().to_string(), cell.to_string());
        }
    }

    let timestamp = Utc::now();
    for (spec, cell) in query.columns.iter().zip(&cells) {
        // The insight map carries everything, labels included.
        output
            .metrics
            .insert(spec.output_key().to_string(), cell.to_string());

        if spec.metric_type == MetricType::Label {
            continue;
        }
        let Some(value) = cell.as_f64() else {
            continue;
        };
        output.points.push(MetricPoint {
            name: spec.output_key().to_string(),
            metric_type: spec.metric_type,
            value,
            labels: labels.clone(),
            timestamp,
        });
    }
    Ok(())
}

fn apply_transform(transform: Option<Transform>, cell: CellValue) -> Result<CellValue> {
    match transform {
        None => Ok(cell),
        Some(Transform::MemSizeBytes) => match &cell {
            CellValue::Str(raw) => Ok(CellValue::Int(parse_mem_size(raw)?)),
            // Already numeric: assume the source reported bytes.
            CellValue::Int(_) | CellValue::Double(_) => Ok(cell),
            other => Err(MetricsError::Scan(format!(
                "cannot parse {other:?} as a memory size"
            ))),
        },
    }
}

/// Parses a memory-size reading like `"80MB"`, `"64kB"` or `"4GB"` into
/// bytes. A bare number is taken as bytes.
pub fn parse_mem_size(raw: &str) -> Result<i64> {
    let trimmed = raw.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    let number: i64 = number
        .parse()
        .map_err(|_| MetricsError::Scan(format!("{raw:?} is not a memory size")))?;
    let multiplier: i64 = match unit.trim().to_lowercase().as_str() {
        "" | "b" => 1,
        "kb" => 1024,
        "mb" => 1024 * 1024,
        "gb" => 1024 * 1024 * 1024,
        "tb" => 1024_i64.pow(4),
        other => {
            return Err(MetricsError::Scan(format!(
                "unknown memory unit {other:?} in {raw:?}"
            )))
        }
    };
    Ok(number * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDb;
    use wlagent_common::types::{ColumnSpec, DatabaseRole};

    fn gauge(source: &str, value_type: ValueType, transform: Option<Transform>) -> ColumnSpec {
        ColumnSpec {
            source_name: source.to_string(),
            output_name: None,
            metric_type: MetricType::Gauge,
            value_type,
            transform,
        }
    }

    fn label(source: &str) -> ColumnSpec {
        ColumnSpec {
            source_name: source.to_string(),
            output_name: None,
            metric_type: MetricType::Label,
            value_type: ValueType::String,
            transform: None,
        }
    }

    #[test]
    fn memory_sizes_parse_to_bytes() {
        assert_eq!(parse_mem_size("80MB").unwrap(), 83_886_080);
        assert_eq!(parse_mem_size("64kB").unwrap(), 65_536);
        assert_eq!(parse_mem_size("4GB").unwrap(), 4_294_967_296);
        assert_eq!(parse_mem_size("8192").unwrap(), 8192);
        assert_eq!(parse_mem_size(" 16 MB ").unwrap(), 16 * 1024 * 1024);
        assert!(parse_mem_size("lots").is_err());
        assert!(parse_mem_size("80XB").is_err());
    }

    #[tokio::test]
    async fn gauge_rows_become_points_and_map_entries() {
        let db = MockDb::new().with_rows(
            "SHOW work_mem",
            vec![vec![CellValue::Str("80MB".to_string())]],
        );
        let queries = vec![Query {
            name: "work_mem".to_string(),
            sql: "SHOW work_mem".to_string(),
            database_role: DatabaseRole::Both,
            columns: vec![gauge("work_mem", ValueType::String, Some(Transform::MemSizeBytes))],
        }];

        let out = run_query_table(&db, &queries, InstanceRole::Primary, Duration::from_secs(5), 4).await;
        assert_eq!(out.failed_queries, 0);
        assert_eq!(out.metrics["work_mem"], "83886080");
        assert_eq!(out.points.len(), 1);
        assert_eq!(out.points[0].name, "work_mem");
        assert_eq!(out.points[0].value, 83_886_080.0);
    }

    #[tokio::test]
    async fn labels_attach_to_every_point_in_the_row()
    {
        let db = MockDb::new().with_rows(
            "SELECT datname, numbackends FROM pg_stat_database",
            vec![
                vec![CellValue::Str("orders".to_string()), CellValue::Int(12)],
                vec![CellValue::Str("billing".to_string()), CellValue::Int(3)],
            ],
        );
        let queries = vec![Query {
            name: "backends".to_string(),
            sql: "SELECT datname, numbackends FROM pg_stat_database".to_string(),
            database_role: DatabaseRole::Both,
            columns: vec![label("datname"), gauge("numbackends", ValueType::Int64, None)],
        }];

        let out = run_query_table(&db, &queries, InstanceRole::Primary, Duration::from_secs(5), 4).await;
        assert_eq!(out.points.len(), 2);
        assert_eq!(out.points[0].labels["datname"], "orders");
        assert_eq!(out.points[1].labels["datname"], "billing");
    }

    #[tokio::test]
    async fn primary_query_never_runs_on_a_standby() {
        let db = MockDb::new().with_rows("SELECT 1", vec![vec![CellValue::Int(1)]]);
        let queries = vec![Query {
            name: "primary_only".to_string(),
            sql: "SELECT 1".to_string(),
            database_role: DatabaseRole::Primary,
            columns: vec![gauge("one", ValueType::Int64, None)],
        }];

        let out = run_query_table(&db, &queries, InstanceRole::Standby, Duration::from_secs(5), 4).await;
        assert!(out.metrics.is_empty());
        assert!(out.points.is_empty());
        assert_eq!(out.failed_queries, 0);

        let out = run_query_table(&db, &queries, InstanceRole::Primary, Duration::from_secs(5), 4).await;
        assert_eq!(out.metrics["one"], "1");
    }

    #[tokio::test]
    async fn failed_query_skips_only_itself() {
        let db = MockDb::new()
            .with_error("SELECT broken", "test-error")
            .with_rows("SELECT 1", vec![vec![CellValue::Int(1)]]);
        let queries = vec![
            Query {
                name: "broken".to_string(),
                sql: "SELECT broken".to_string(),
                database_role: DatabaseRole::Both,
                columns: vec![gauge("broken", ValueType::Int64, None)],
            },
            Query {
                name: "one".to_string(),
                sql: "SELECT 1".to_string(),
                database_role: DatabaseRole::Both,
                columns: vec![gauge("one", ValueType::Int64, None)],
            },
        ];

        let out = run_query_table(&db, &queries, InstanceRole::Primary, Duration::from_secs(5), 4).await;
        assert_eq!(out.failed_queries, 1);
        assert!(!out.metrics.contains_key("broken"));
        assert_eq!(out.metrics["one"], "1");
    }

    #[tokio::test]
    async fn short_row_is_dropped_others_survive() {
        let db = MockDb::new().with_rows(
            "SELECT a, b",
            vec![
                vec![CellValue::Int(1)],
                vec![CellValue::Int(2), CellValue::Int(3)],
            ],
        );
        let queries = vec![Query {
            name: "ab".to_string(),
            sql: "SELECT a, b".to_string(),
            database_role: DatabaseRole::Both,
            columns: vec![gauge("a", ValueType::Int64, None), gauge("b", ValueType::Int64, None)],
        }];

        let out = run_query_table(&db, &queries, InstanceRole::Primary, Duration::from_secs(5), 4).await;
        assert_eq!(out.metrics["a"], "2");
        assert_eq!(out.metrics["b"], "3");
        assert_eq!(out.points.len(), 2);
    }
}
