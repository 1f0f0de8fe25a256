//! Prometheus Sink Adapter
//!
//! Implements the `MetricSink` port by writing readings into a [`MetricSet`].

use std::sync::Arc;

use tracing::debug;

use crate::domain::ports::{MetricSink, Reading};
use crate::error::Result;
use crate::metrics::MetricSet;

/// Condition indicator value for the current condition label.
const CONDITION_PRESENT: f64 = 1.0;

/// Prometheus-backed metric sink.
///
/// Each gauge write is independent; a scrape running concurrently may see a
/// mix of this cycle's and the previous cycle's values.
#[derive(Clone)]
pub struct PrometheusSink {
    metrics: Arc<MetricSet>,
}

impl PrometheusSink {
    /// Create a sink writing into `metrics`.
    pub fn new(metrics: Arc<MetricSet>) -> Self {
        Self { metrics }
    }

    /// The underlying gauge set.
    pub fn metrics(&self) -> &MetricSet {
        &self.metrics
    }
}

impl std::fmt::Debug for PrometheusSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusSink")
            .field("metrics", &self.metrics)
            .finish()
    }
}

impl MetricSink for PrometheusSink {
    fn publish(&self, city: &str, reading: &Reading) -> Result<()> {
        let m = &self.metrics;
        let labels = [city, reading.country.as_str()];

        let values = [
            (&m.temperature, reading.temperature),
            (&m.temperature_min, reading.temp_min),
            (&m.temperature_max, reading.temp_max),
            (&m.temperature_feel, reading.feels_like),
            (&m.humidity, reading.humidity),
            (&m.pressure, reading.pressure),
            (&m.wind_direction, reading.wind_deg),
            (&m.wind_speed, reading.wind_speed),
            (&m.cloudiness, reading.cloudiness),
            (&m.sunrise_time, reading.sunrise as f64),
            (&m.sunset_time, reading.sunset as f64),
        ];
        for (gauge, value) in values {
            gauge.get_metric_with_label_values(&labels)?.set(value);
        }

        m.weather_condition
            .get_metric_with_label_values(&[city, reading.country.as_str(), reading.condition.as_str()])?
            .set(CONDITION_PRESENT);

        debug!(city, country = %reading.country, "Updated metrics");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading() -> Reading {
        Reading {
            temperature: 26.85,
            temp_min: 25.0,
            temp_max: 28.85,
            feels_like: 28.35,
            humidity: 40.0,
            pressure: 1013.0,
            wind_deg: 240.0,
            wind_speed: 3.6,
            cloudiness: 20.0,
            sunrise: 1718247600,
            sunset: 1718307600,
            condition: "clear sky".to_string(),
            country: "DE".to_string(),
        }
    }

    #[test]
    fn test_publish_writes_all_gauges() {
        let metrics = Arc::new(MetricSet::new().unwrap());
        let sink = PrometheusSink::new(Arc::clone(&metrics));

        sink.publish("Berlin", &reading()).unwrap();

        let labels = [("city", "Berlin"), ("country", "DE")];
        assert_eq!(metrics.value("owm_temperature", &labels), Some(26.85));
        assert_eq!(metrics.value("owm_temperature_min", &labels), Some(25.0));
        assert_eq!(metrics.value("owm_temperature_max", &labels), Some(28.85));
        assert_eq!(metrics.value("owm_temperature_feel", &labels), Some(28.35));
        assert_eq!(metrics.value("owm_humidity", &labels), Some(40.0));
        assert_eq!(metrics.value("owm_pressure", &labels), Some(1013.0));
        assert_eq!(metrics.value("owm_wind_direction", &labels), Some(240.0));
        assert_eq!(metrics.value("owm_wind_speed", &labels), Some(3.6));
        assert_eq!(metrics.value("owm_cloudiness", &labels), Some(20.0));
        assert_eq!(metrics.value("owm_sunrise_time", &labels), Some(1718247600.0));
        assert_eq!(metrics.value("owm_sunset_time", &labels), Some(1718307600.0));
        assert_eq!(
            metrics.value(
                "owm_weather_condition",
                &[("city", "Berlin"), ("country", "DE"), ("condition", "clear sky")]
            ),
            Some(1.0)
        );
    }

    #[test]
    fn test_publish_overwrites_previous_value() {
        let metrics = Arc::new(MetricSet::new().unwrap());
        let sink = PrometheusSink::new(Arc::clone(&metrics));

        let mut first = reading();
        sink.publish("Berlin", &first).unwrap();
        first.temperature = 10.0;
        sink.publish("Berlin", &first).unwrap();

        assert_eq!(
            metrics.value("owm_temperature", &[("city", "Berlin"), ("country", "DE")]),
            Some(10.0)
        );
    }

    #[test]
    fn test_old_condition_labels_are_not_expired() {
        let metrics = Arc::new(MetricSet::new().unwrap());
        let sink = PrometheusSink::new(Arc::clone(&metrics));

        let mut r = reading();
        sink.publish("Berlin", &r).unwrap();
        r.condition = "light rain".to_string();
        sink.publish("Berlin", &r).unwrap();

        let condition = |c: &str| {
            metrics.value(
                "owm_weather_condition",
                &[("city", "Berlin"), ("country", "DE"), ("condition", c)],
            )
        };
        assert_eq!(condition("light rain"), Some(1.0));
        assert_eq!(condition("clear sky"), Some(1.0));
    }
}
