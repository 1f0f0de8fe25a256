//! Domain Ports (Port/Adapter Pattern)
//!
//! This module defines the abstractions the poll loop depends on. The
//! weather source and the metrics exposition are both external
//! collaborators; infrastructure adapters implement these traits.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │        WeatherProvider   │   MetricSink              │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │    OpenWeatherClient   │   PrometheusSink            │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Offset between the Kelvin and Celsius scales.
const KELVIN_OFFSET: f64 = 273.15;

/// Label value used when the provider omits country or condition.
pub const UNKNOWN_LABEL: &str = "unknown";

// =============================================================================
// Value Objects
// =============================================================================

/// Temperature unit published by the exporter.
///
/// The provider always answers in Kelvin; `C` and `F` are converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Units {
    #[serde(rename = "K")]
    Kelvin,
    #[default]
    #[serde(rename = "C")]
    Celsius,
    #[serde(rename = "F")]
    Fahrenheit,
}

impl Units {
    /// Convert a Kelvin value into this unit, rounded to two decimals.
    pub fn convert_from_kelvin(self, kelvin: f64) -> f64 {
        let value = match self {
            Units::Kelvin => return kelvin,
            Units::Celsius => kelvin - KELVIN_OFFSET,
            Units::Fahrenheit => (kelvin - KELVIN_OFFSET) * 9.0 / 5.0 + 32.0,
        };
        (value * 100.0).round() / 100.0
    }
}

impl std::fmt::Display for Units {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Units::Kelvin => write!(f, "K"),
            Units::Celsius => write!(f, "C"),
            Units::Fahrenheit => write!(f, "F"),
        }
    }
}

impl FromStr for Units {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "K" => Ok(Units::Kelvin),
            "C" => Ok(Units::Celsius),
            "F" => Ok(Units::Fahrenheit),
            _ => Err(Error::invalid("units", s, "expected one of K, C, F")),
        }
    }
}

/// A configured place to poll.
///
/// `name` is optional at the type level so that a nameless entry can be
/// skipped with a warning instead of failing the whole config. Numeric or
/// boolean names are taken as their text, and coordinates may be quoted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, deserialize_with = "scalar_name")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "coordinate")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "coordinate")]
    pub lon: Option<f64>,
}

/// Any scalar a config document may carry.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Integer(i64),
    Float(f64),
    Flag(bool),
}

fn scalar_name<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(|scalar| match scalar {
        Scalar::Text(s) => s,
        Scalar::Integer(i) => i.to_string(),
        Scalar::Float(f) => f.to_string(),
        Scalar::Flag(b) => b.to_string(),
    }))
}

fn coordinate<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error as _;

    match Option::<Scalar>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Scalar::Integer(i)) => Ok(Some(i as f64)),
        Some(Scalar::Float(f)) => Ok(Some(f)),
        Some(Scalar::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid coordinate {:?}", s))),
        Some(Scalar::Flag(b)) => Err(D::Error::custom(format!("invalid coordinate {}", b))),
    }
}

impl Location {
    /// Location queried by city name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            lat: None,
            lon: None,
        }
    }

    /// Location queried by coordinates, labeled by `name`.
    pub fn at(name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            name: Some(name.into()),
            lat: Some(lat),
            lon: Some(lon),
        }
    }

    /// The city label, if the entry has a usable one.
    pub fn city(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.trim().is_empty())
    }

    /// How the provider should be asked for this location.
    ///
    /// Coordinates win only when both are set; otherwise the name is used.
    pub fn query(&self) -> Option<LocationQuery> {
        let city = self.city()?;
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(LocationQuery::Coordinates { lat, lon }),
            _ => Some(LocationQuery::Name(city.to_string())),
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.name, self.lat, self.lon) {
            (Some(name), Some(lat), Some(lon)) => write!(f, "{} ({}, {})", name, lat, lon),
            (Some(name), _, _) => write!(f, "{}", name),
            (None, lat, lon) => write!(f, "<unnamed lat={:?} lon={:?}>", lat, lon),
        }
    }
}

/// Provider lookup key derived from a [`Location`].
#[derive(Debug, Clone, PartialEq)]
pub enum LocationQuery {
    Name(String),
    Coordinates { lat: f64, lon: f64 },
}

/// Raw provider answer, temperatures in Kelvin.
///
/// The temperature family is required; everything else may be absent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Observation {
    pub temperature: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub feels_like: f64,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub wind_deg: Option<f64>,
    pub wind_speed: Option<f64>,
    pub cloudiness: Option<f64>,
    pub sunrise: Option<i64>,
    pub sunset: Option<i64>,
    pub condition: Option<String>,
    pub country: Option<String>,
}

/// Values published for one location in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub temperature: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub feels_like: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub wind_deg: f64,
    pub wind_speed: f64,
    pub cloudiness: f64,
    pub sunrise: i64,
    pub sunset: i64,
    pub condition: String,
    pub country: String,
}

impl Reading {
    /// Derive the published values from a raw observation.
    ///
    /// `convert` is applied to the four temperature fields only, and only
    /// when `units` is not Kelvin. Absent optional fields become `0`, absent
    /// labels become `"unknown"`.
    pub fn from_observation<F>(observation: Observation, units: Units, convert: F) -> Self
    where
        F: Fn(f64, Units) -> f64,
    {
        let temp = |kelvin: f64| {
            if units == Units::Kelvin {
                kelvin
            } else {
                convert(kelvin, units)
            }
        };

        Self {
            temperature: temp(observation.temperature),
            temp_min: temp(observation.temp_min),
            temp_max: temp(observation.temp_max),
            feels_like: temp(observation.feels_like),
            humidity: observation.humidity.unwrap_or(0.0),
            pressure: observation.pressure.unwrap_or(0.0),
            wind_deg: observation.wind_deg.unwrap_or(0.0),
            wind_speed: observation.wind_speed.unwrap_or(0.0),
            cloudiness: observation.cloudiness.unwrap_or(0.0),
            sunrise: observation.sunrise.unwrap_or(0),
            sunset: observation.sunset.unwrap_or(0),
            condition: non_empty_or_unknown(observation.condition),
            country: non_empty_or_unknown(observation.country),
        }
    }
}

fn non_empty_or_unknown(value: Option<String>) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| UNKNOWN_LABEL.to_string())
}

// =============================================================================
// Weather Provider Port
// =============================================================================

/// Port for fetching current weather.
///
/// Every call may fail independently; callers isolate failures per location.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Current weather for a city name.
    async fn fetch_by_name(&self, city: &str) -> Result<Observation>;

    /// Current weather at a coordinate pair.
    async fn fetch_by_coordinates(&self, lat: f64, lon: f64) -> Result<Observation>;

    /// Convert a Kelvin temperature into `unit`.
    fn convert_temperature(&self, kelvin: f64, unit: Units) -> f64 {
        unit.convert_from_kelvin(kelvin)
    }

    /// Dispatch a [`LocationQuery`] to the matching fetch call.
    async fn fetch(&self, query: &LocationQuery) -> Result<Observation> {
        match query {
            LocationQuery::Name(city) => self.fetch_by_name(city).await,
            LocationQuery::Coordinates { lat, lon } => self.fetch_by_coordinates(*lat, *lon).await,
        }
    }
}

// =============================================================================
// Metric Sink Port
// =============================================================================

/// Port for publishing readings.
///
/// Writes are keyed by `(city, reading.country)`; the condition indicator
/// additionally by `reading.condition`. Last writer wins.
pub trait MetricSink: Send + Sync {
    /// Publish every field of `reading` for `city`.
    fn publish(&self, city: &str, reading: &Reading) -> Result<()>;
}
