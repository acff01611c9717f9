//! Diagnostic metric override file.
//!
//! Operators can drop a `key: value` file on the host to emit synthetic
//! batches alongside live collection, grouped under `workload_type:` headers.
//! The file is read-only to the agent and its absence is normal.

use std::collections::HashMap;
use std::path::Path;

use wlagent_common::types::{WorkloadMetrics, WorkloadType};

/// Where the override file lives.
pub const METRIC_OVERRIDE_PATH: &str = "/etc/wlagent/wlmmetricoverride.yaml";

/// Parses override-file content into one batch per `workload_type:` group.
pub fn parse_override(content: &str) -> Vec<WorkloadMetrics> {
    let mut batches = Vec::new();
    let mut workload_type: Option<WorkloadType> = None;
    let mut metrics: HashMap<String, String> = HashMap::new();

    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            tracing::warn!(line, "override metric line has no separator");
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        if key == "workload_type" {
            if let Some(previous) = workload_type.take() {
                batches.push(WorkloadMetrics {
                    workload_type: previous,
                    metrics: std::mem::take(&mut metrics),
                });
            }
            workload_type = Some(value.parse().unwrap_or(WorkloadType::Unknown));
            continue;
        }
        metrics.insert(key.to_string(), value.to_string());
    }

    if let Some(last) = workload_type {
        batches.push(WorkloadMetrics {
            workload_type: last,
            metrics,
        });
    }
    batches
}

/// Reads the override file; an unreadable file yields no batches.
pub fn collect_override_metrics(path: &Path) -> Vec<WorkloadMetrics> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_override(&content),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "could not read the metric override file");
            Vec::new()
        }
    }
}
