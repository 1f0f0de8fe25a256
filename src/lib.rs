//! OpenWeatherMap Prometheus Exporter
//!
//! Polls current weather for a fixed list of locations and republishes it as
//! Prometheus gauges on a scrape endpoint.
//!
//! # Architecture
//!
//! ```text
//! ConfigResolver → PollLoop ──▶ WeatherProvider (OpenWeatherMap)
//!                     │
//!                     └──────▶ MetricSink (Prometheus) ◀── /metrics scrape
//! ```
//!
//! The poll loop runs one sequential sweep per interval. A failure for one
//! location never prevents the others from updating, and only a shutdown
//! signal ends the loop.
//!
//! # Modules
//!
//! - [`adapters`] - Infrastructure adapters implementing domain ports
//! - [`config`] - Layered runtime configuration
//! - [`domain`] - Value objects and port traits
//! - [`error`] - Error types
//! - [`lifecycle`] - Running flag and signal handling
//! - [`metrics`] - Gauge set and scrape server
//! - [`poller`] - The poll-and-publish loop

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod poller;

// Re-export commonly used types
pub use adapters::{InMemorySink, OpenWeatherClient, OpenWeatherConfig, PrometheusSink};
pub use config::{CliOverrides, ConfigResolver, EnvOverrides, LogLevel, RuntimeConfig};
pub use domain::{Location, LocationQuery, MetricSink, Observation, Reading, Units, WeatherProvider};
pub use error::{Error, Result};
pub use lifecycle::LifecycleController;
pub use metrics::{MetricSet, MetricsServer};
pub use poller::{CycleReport, PollLoop, PollLoopConfig, PollState};
