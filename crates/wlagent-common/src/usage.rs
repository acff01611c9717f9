//! Usage-metric reporting.
//!
//! Every distinct failure class in the agent carries a stable numeric code so
//! fleet-wide dashboards can aggregate them without parsing log text. The
//! sink itself is a seam: production wires the logging sink, tests wire a
//! recording one.

use std::sync::Mutex;

/// Stable error codes recorded against usage metrics.
///
/// Codes are append-only; renumbering breaks fleet dashboards.
pub mod codes {
    pub const CONFIG_LOAD_FAILURE: i32 = 1;
    pub const COMMON_DISCOVERY_FAILURE: i32 = 2;
    pub const DATA_WAREHOUSE_WRITE_INSIGHT_FAILURE: i32 = 3;
    pub const SECRET_FETCH_FAILURE: i32 = 4;
    pub const TIME_SERIES_WRITE_FAILURE: i32 = 5;
    pub const METRIC_OVERRIDE_FAILURE: i32 = 6;

    pub const ORACLE_SERVICE_ERROR: i32 = 10;
    pub const ORACLE_DISCOVERY_FAILURE: i32 = 11;
    pub const ORACLE_METRIC_COLLECTION_FAILURE: i32 = 12;

    pub const MYSQL_SERVICE_ERROR: i32 = 20;
    pub const MYSQL_DISCOVERY_FAILURE: i32 = 21;
    pub const MYSQL_METRIC_COLLECTION_FAILURE: i32 = 22;

    pub const POSTGRES_SERVICE_ERROR: i32 = 30;
    pub const POSTGRES_DISCOVERY_FAILURE: i32 = 31;
    pub const POSTGRES_METRIC_COLLECTION_FAILURE: i32 = 32;

    pub const REDIS_SERVICE_ERROR: i32 = 40;
    pub const REDIS_DISCOVERY_FAILURE: i32 = 41;
    pub const REDIS_METRIC_COLLECTION_FAILURE: i32 = 42;

    pub const MONGODB_SERVICE_ERROR: i32 = 50;
    pub const MONGODB_DISCOVERY_FAILURE: i32 = 51;
    pub const MONGODB_METRIC_COLLECTION_FAILURE: i32 = 52;

    pub const SQLSERVER_SERVICE_ERROR: i32 = 60;
    pub const SQLSERVER_DISCOVERY_FAILURE: i32 = 61;
    pub const SQLSERVER_METRIC_COLLECTION_FAILURE: i32 = 62;
}

/// Lifecycle and error events reported to the usage sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageEvent {
    Configured,
    Started,
    Running,
    Stopped,
    Error(i32),
}

/// Thread-safe sink for usage events.
pub trait UsageSink: Send + Sync {
    fn record(&self, event: UsageEvent);
}

/// Default sink: emits usage events as structured log lines.
#[derive(Debug, Default)]
pub struct LogUsageSink;

impl UsageSink for LogUsageSink {
    fn record(&self, event: UsageEvent) {
        match event {
            UsageEvent::Error(code) => {
                tracing::warn!(code, agent = crate::AGENT_NAME, "usage metric: error")
            }
            other => tracing::info!(event = ?other, agent = crate::AGENT_NAME, "usage metric"),
        }
    }
}

/// Test sink that records every event it sees.
#[derive(Debug, Default)]
pub struct RecordingUsageSink {
    events: Mutex<Vec<UsageEvent>>,
}

impl RecordingUsageSink {
    pub fn events(&self) -> Vec<UsageEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl UsageSink for RecordingUsageSink {
    fn record(&self, event: UsageEvent) {
        self.events.lock().unwrap().push(event);
    }
}
