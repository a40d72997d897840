pub mod cloud_config;
pub mod error;
pub mod loader;
pub mod metrics;
mod raw;

pub use cloud_config::CloudConfig;
pub use error::ConfigError;
pub use loader::{build_report_document, parse_state_document};
pub use metrics::{ProcessMetric, SystemMetrics};
pub use raw::{RawApp, RawDeviceState, RawService, RawStateDocument};
