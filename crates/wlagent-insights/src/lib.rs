//! Shipping collected metrics to the cloud back-ends.

pub mod override_file;
pub mod shipper;
pub mod timeseries;

pub use override_file::{collect_override_metrics, parse_override, METRIC_OVERRIDE_PATH};
pub use shipper::InsightShipper;
pub use timeseries::TimeSeriesShipper;
