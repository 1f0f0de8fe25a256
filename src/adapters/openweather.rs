//! OpenWeatherMap Adapter
//!
//! Implements the `WeatherProvider` port against the OpenWeatherMap
//! current-weather endpoint. Requests carry no `units` parameter, so every
//! temperature comes back in Kelvin.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::domain::ports::{Observation, WeatherProvider};
use crate::error::{Error, Result};

/// Public OpenWeatherMap API host.
pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

const WEATHER_PATH: &str = "/data/2.5/weather";

/// Longest error body kept in a `ProviderStatus` error.
const MAX_ERROR_BODY: usize = 512;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the OpenWeatherMap client
#[derive(Clone)]
pub struct OpenWeatherConfig {
    /// API key sent as `appid`
    pub api_key: String,

    /// Scheme and host, without trailing slash
    pub base_url: String,

    /// Per-request timeout
    pub timeout: Duration,
}

impl OpenWeatherConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Debug for OpenWeatherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenWeatherConfig")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    main: MainBlock,
    #[serde(default)]
    sys: Option<SysBlock>,
    #[serde(default)]
    wind: Option<WindBlock>,
    #[serde(default)]
    clouds: Option<CloudsBlock>,
    #[serde(default)]
    weather: Vec<ConditionBlock>,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: f64,
    temp_min: f64,
    temp_max: f64,
    feels_like: f64,
    #[serde(default)]
    humidity: Option<f64>,
    #[serde(default)]
    pressure: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct SysBlock {
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    sunrise: Option<i64>,
    #[serde(default)]
    sunset: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct WindBlock {
    #[serde(default)]
    speed: Option<f64>,
    #[serde(default)]
    deg: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct CloudsBlock {
    #[serde(default)]
    all: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ConditionBlock {
    #[serde(default)]
    description: Option<String>,
}

impl From<WeatherResponse> for Observation {
    fn from(response: WeatherResponse) -> Self {
        let sys = response.sys.unwrap_or_default();
        let wind = response.wind.unwrap_or_default();
        let clouds = response.clouds.unwrap_or_default();

        Observation {
            temperature: response.main.temp,
            temp_min: response.main.temp_min,
            temp_max: response.main.temp_max,
            feels_like: response.main.feels_like,
            humidity: response.main.humidity,
            pressure: response.main.pressure,
            wind_deg: wind.deg,
            wind_speed: wind.speed,
            cloudiness: clouds.all,
            sunrise: sys.sunrise,
            sunset: sys.sunset,
            condition: response
                .weather
                .into_iter()
                .next()
                .and_then(|w| w.description),
            country: sys.country,
        }
    }
}

/// Decode a current-weather JSON body.
///
/// Fails when the body is not JSON or lacks any `main` temperature field.
pub fn parse_observation(body: &str) -> Result<Observation> {
    serde_json::from_str::<WeatherResponse>(body)
        .map(Observation::from)
        .map_err(|e| Error::ProviderResponse(e.to_string()))
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client for the OpenWeatherMap current-weather API
pub struct OpenWeatherClient {
    config: OpenWeatherConfig,
    client: Client,
}

impl OpenWeatherClient {
    /// Create a new client
    pub fn new(config: OpenWeatherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(Error::ProviderConnection)?;

        Ok(Self { config, client })
    }

    fn by_name_url(&self, city: &str) -> String {
        format!(
            "{}{}?q={}&appid={}",
            self.config.base_url,
            WEATHER_PATH,
            urlencoding::encode(city),
            urlencoding::encode(&self.config.api_key)
        )
    }

    fn by_coordinates_url(&self, lat: f64, lon: f64) -> String {
        format!(
            "{}{}?lat={}&lon={}&appid={}",
            self.config.base_url,
            WEATHER_PATH,
            lat,
            lon,
            urlencoding::encode(&self.config.api_key)
        )
    }

    /// The URL embeds the API key; it is never logged.
    async fn get(&self, url: &str) -> Result<Observation> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::ProviderConnection(e.without_url()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::ProviderConnection(e.without_url()))?;

        if !status.is_success() {
            let mut body = body;
            body.truncate(floor_char_boundary(&body, MAX_ERROR_BODY));
            return Err(Error::ProviderStatus {
                status: status.as_u16(),
                body,
            });
        }

        parse_observation(&body)
    }
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    (0..=max).rev().find(|i| s.is_char_boundary(*i)).unwrap_or(0)
}

impl std::fmt::Debug for OpenWeatherClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenWeatherClient")
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    #[instrument(skip(self))]
    async fn fetch_by_name(&self, city: &str) -> Result<Observation> {
        debug!("Querying current weather by name");
        self.get(&self.by_name_url(city)).await
    }

    #[instrument(skip(self))]
    async fn fetch_by_coordinates(&self, lat: f64, lon: f64) -> Result<Observation> {
        debug!("Querying current weather by coordinates");
        self.get(&self.by_coordinates_url(lat, lon)).await
    }
}
