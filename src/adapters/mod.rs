//! Infrastructure Adapters
//!
//! Implementations of the domain ports.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │            WeatherProvider   │   MetricSink                 │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │  OpenWeatherClient │ PrometheusSink │ InMemorySink          │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod memory;
mod openweather;
mod prometheus;

pub use memory::InMemorySink;
pub use openweather::{parse_observation, OpenWeatherClient, OpenWeatherConfig, DEFAULT_BASE_URL};
pub use self::prometheus::PrometheusSink;
