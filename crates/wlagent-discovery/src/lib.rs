//! Host process discovery and the fan-out that feeds every workload service.

pub mod fanout;
pub mod process;

pub use fanout::{DiscoveryFanout, DiscoveryMessage, DiscoveryResult, MessageOrigin};
pub use process::{ProcessError, ProcessHandle, ProcessLister, SystemProcessLister};

/// Returns true if `name` starts with any of `prefixes`.
pub fn has_any_prefix(name: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|p| name.starts_with(p))
}
