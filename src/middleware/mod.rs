pub mod logging;
pub mod metrics;

pub use logging::request_logging;
pub use metrics::record_metrics;
