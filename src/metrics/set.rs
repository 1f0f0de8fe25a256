//! Metric Set
//!
//! The twelve gauges the exporter publishes, registered on a private
//! [`Registry`] that the scrape server encodes. The set carries identity and
//! label schema only; values are written through the `PrometheusSink` adapter.
//!
//! # Staleness
//!
//! `owm_weather_condition` is a presence indicator: the current condition
//! label is set to `1`. Label sets from earlier conditions are not expired
//! and keep reporting `1` until the process restarts.

use prometheus::proto::MetricFamily;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

use crate::error::Result;

/// Labels carried by every gauge except the condition indicator.
pub const LOCATION_LABELS: &[&str] = &["city", "country"];

/// Labels carried by `owm_weather_condition`.
pub const CONDITION_LABELS: &[&str] = &["city", "country", "condition"];

/// Gauge names, in publication order.
pub const GAUGE_NAMES: [&str; 12] = [
    "owm_temperature",
    "owm_temperature_min",
    "owm_temperature_max",
    "owm_temperature_feel",
    "owm_humidity",
    "owm_pressure",
    "owm_wind_direction",
    "owm_wind_speed",
    "owm_cloudiness",
    "owm_sunrise_time",
    "owm_sunset_time",
    "owm_weather_condition",
];

/// Published gauges plus the registry that owns them.
#[derive(Clone)]
pub struct MetricSet {
    registry: Registry,

    pub temperature: GaugeVec,
    pub temperature_min: GaugeVec,
    pub temperature_max: GaugeVec,
    pub temperature_feel: GaugeVec,
    pub humidity: GaugeVec,
    pub pressure: GaugeVec,
    pub wind_direction: GaugeVec,
    pub wind_speed: GaugeVec,
    pub cloudiness: GaugeVec,
    pub sunrise_time: GaugeVec,
    pub sunset_time: GaugeVec,
    pub weather_condition: GaugeVec,
}

impl MetricSet {
    /// Create the gauges on a fresh registry.
    pub fn new() -> Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Create the gauges on `registry`.
    ///
    /// Fails if any of the names is already registered there.
    pub fn with_registry(registry: Registry) -> Result<Self> {
        let location = |name: &str, help: &str| gauge(&registry, name, help, LOCATION_LABELS);

        let set = Self {
            temperature: location("owm_temperature", "The current Temperature")?,
            temperature_min: location(
                "owm_temperature_min",
                "Minimum temperature at the moment (within large megalopolises and urban areas)",
            )?,
            temperature_max: location(
                "owm_temperature_max",
                "Maximum temperature at the moment (within large megalopolises and urban areas).",
            )?,
            temperature_feel: location(
                "owm_temperature_feel",
                "Temperature. This temperature parameter accounts for the human perception of weather.",
            )?,
            humidity: location("owm_humidity", "Humidity, %")?,
            pressure: location(
                "owm_pressure",
                "Atmospheric pressure on the sea level, hPa",
            )?,
            wind_direction: location(
                "owm_wind_direction",
                "Wind direction, degrees (meteorological)",
            )?,
            wind_speed: location("owm_wind_speed", "Wind Speed")?,
            cloudiness: location("owm_cloudiness", "Cloudiness, %")?,
            sunrise_time: location("owm_sunrise_time", "Sunrise Time")?,
            sunset_time: location("owm_sunset_time", "Sunset Time")?,
            weather_condition: gauge(
                &registry,
                "owm_weather_condition",
                "Weather Condition",
                CONDITION_LABELS,
            )?,
            registry,
        };

        Ok(set)
    }

    /// Registry holding the gauges.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Snapshot of all metric families.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Encode the current values in the text exposition format.
    pub fn encode_text(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.gather(), &mut buffer)?;
        Ok(buffer)
    }

    /// Current value of `name` for exactly the given label pairs.
    ///
    /// Reads from a gathered snapshot, so a label set that was never written
    /// stays absent instead of being created at zero.
    pub fn value(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        self.gather()
            .iter()
            .find(|family| family.get_name() == name)?
            .get_metric()
            .iter()
            .find(|metric| {
                let pairs = metric.get_label();
                pairs.len() == labels.len()
                    && labels.iter().all(|(key, value)| {
                        pairs
                            .iter()
                            .any(|p| p.get_name() == *key && p.get_value() == *value)
                    })
            })
            .map(|metric| metric.get_gauge().value())
    }

    /// Gauge family by its exposed name.
    pub fn by_name(&self, name: &str) -> Option<&GaugeVec> {
        let vec = match name {
            "owm_temperature" => &self.temperature,
            "owm_temperature_min" => &self.temperature_min,
            "owm_temperature_max" => &self.temperature_max,
            "owm_temperature_feel" => &self.temperature_feel,
            "owm_humidity" => &self.humidity,
            "owm_pressure" => &self.pressure,
            "owm_wind_direction" => &self.wind_direction,
            "owm_wind_speed" => &self.wind_speed,
            "owm_cloudiness" => &self.cloudiness,
            "owm_sunrise_time" => &self.sunrise_time,
            "owm_sunset_time" => &self.sunset_time,
            "owm_weather_condition" => &self.weather_condition,
            _ => return None,
        };
        Some(vec)
    }
}

impl std::fmt::Debug for MetricSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricSet")
            .field("gauges", &GAUGE_NAMES.len())
            .finish()
    }
}

fn gauge(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> Result<GaugeVec> {
    let vec = GaugeVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(vec.clone()))?;
    Ok(vec)
}
