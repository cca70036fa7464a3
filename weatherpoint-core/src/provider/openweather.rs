use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::{ConfigError, FetchError},
    model::{Coordinates, Location, RawObservation},
    provider::{Credential, ProviderId, truncate_body},
};

use super::WeatherProvider;

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";
const CURRENT_WEATHER_PATH: &str = "/data/2.5/weather";

/// Per-request transport timeout. Much shorter than any sensible refresh interval.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Current weather from OpenWeatherMap for one fixed point.
///
/// See <https://openweathermap.org/current>. Units are left at the API default
/// (Kelvin, hPa) and converted on ingestion.
#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    coordinates: Coordinates,
    credential: Credential,
    base_url: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(coordinates: Coordinates, credential: Credential) -> Result<Self, ConfigError> {
        let http = Client::builder()
            .user_agent(concat!("weatherpoint/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        tracing::info!(
            lat = coordinates.lat(),
            lon = coordinates.lon(),
            "OpenWeatherProvider(<WEATHER_API_TOKEN>) created"
        );

        Ok(Self {
            coordinates,
            credential,
            base_url: DEFAULT_BASE_URL.to_string(),
            http,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self) -> String {
        format!("{}{}", self.base_url, CURRENT_WEATHER_PATH)
    }
}

#[derive(Debug, Deserialize)]
struct OwCoord {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Default, Deserialize)]
struct OwMain {
    temp: Option<f64>,
    humidity: Option<f64>,
    pressure: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    cod: Option<Value>,
    message: Option<Value>,
    coord: Option<OwCoord>,
    name: Option<String>,
    dt: Option<i64>,
    timezone: Option<i32>,
    #[serde(default)]
    main: OwMain,
}

impl OwCurrentResponse {
    /// The body carries its own status code; numeric or string depending on endpoint.
    fn code(&self) -> Option<i64> {
        match self.cod.as_ref()? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn error_message(&self) -> String {
        match &self.message {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            _ => format!("Unknown error: cod={:?}", self.cod),
        }
    }

    fn observed_at(&self) -> Option<DateTime<FixedOffset>> {
        let utc = DateTime::from_timestamp(self.dt?, 0)?;
        let offset = FixedOffset::east_opt(self.timezone.unwrap_or(0))
            .or_else(|| FixedOffset::east_opt(0))?;
        Some(utc.with_timezone(&offset))
    }
}

impl From<OwCurrentResponse> for RawObservation {
    fn from(r: OwCurrentResponse) -> Self {
        let observed_at = r.observed_at();
        RawObservation {
            location: r.coord.map(|c| Location { lat: c.lat, lon: c.lon }),
            title: r.name,
            observed_at,
            temperature_k: r.main.temp,
            humidity_percent: r.main.humidity,
            pressure_hpa: r.main.pressure,
        }
    }
}

// The request URL carries `appid`; it must not end up in the error text.
fn transport_error(err: reqwest::Error) -> FetchError {
    FetchError::Unreachable(err.without_url())
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenWeather
    }

    async fn fetch(&self) -> Result<RawObservation, FetchError> {
        let res = self
            .http
            .get(self.url())
            .query(&[
                ("lat", self.coordinates.lat().to_string()),
                ("lon", self.coordinates.lon().to_string()),
                ("appid", self.credential.expose().to_string()),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let status = res.status();
        let body = res.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(FetchError::UpstreamStatus {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let parsed: OwCurrentResponse = serde_json::from_str(&body)?;

        if parsed.code() != Some(200) {
            return Err(FetchError::UpstreamError(parsed.error_message()));
        }

        Ok(parsed.into())
    }
}
