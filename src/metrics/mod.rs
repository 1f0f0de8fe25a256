//! Metrics module
//!
//! The published gauge set and the HTTP endpoint that exposes it.

mod server;
mod set;

pub use server::MetricsServer;
pub use set::{MetricSet, CONDITION_LABELS, GAUGE_NAMES, LOCATION_LABELS};
