pub mod types;
pub mod usage;

/// Agent name reported in insight payloads and usage metrics.
pub const AGENT_NAME: &str = "wlagent";

/// Agent version reported in insight payloads and usage metrics.
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");
