mod aggregator;
mod progress_info;
mod update_interfaces;

pub use aggregator::{ProgressAggregator, PROGRESS_REPORT_INTERVAL_MS, UNKNOWN_TOTAL};
pub use progress_info::{bitrate_indication, ProgressSnapshot};
pub use update_interfaces::{NoOpProgressReporter, ProgressReporter};
