//! Domain Layer
//!
//! Value objects describing what is polled and what is published, plus the
//! port traits the poll loop depends on.
//!
//! # Architecture
//!
//! ```text
//!  ConfigResolver ──▶ PollLoop ──▶ WeatherProvider (port)
//!                        │
//!                        └──────▶ MetricSink (port)
//! ```
//!
//! Adapters in [`crate::adapters`] implement the ports against
//! OpenWeatherMap and Prometheus.

pub mod ports;

pub use ports::{
    // Port traits
    MetricSink,
    WeatherProvider,
    // Value objects
    Location,
    LocationQuery,
    Observation,
    Reading,
    Units,
};
