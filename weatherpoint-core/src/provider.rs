use crate::{
    Config,
    error::{ConfigError, FetchError},
    model::RawObservation,
    provider::{fake::FakeProvider, openweather::OpenWeatherProvider},
};
use async_trait::async_trait;
use std::{convert::TryFrom, fmt::Debug, sync::Arc};

pub mod fake;
pub mod openweather;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenWeather,
    Fake,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenWeather => "openweather",
            ProviderId::Fake => "fake",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::OpenWeather, ProviderId::Fake]
    }

    /// Whether the provider needs an access credential to be constructed.
    pub fn requires_api_key(&self) -> bool {
        matches!(self, ProviderId::OpenWeather)
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "openweather" => Ok(ProviderId::OpenWeather),
            "fake" => Ok(ProviderId::Fake),
            _ => {
                let supported: Vec<&str> = ProviderId::all().iter().map(|id| id.as_str()).collect();
                Err(anyhow::anyhow!(
                    "Unknown provider '{value}'. Supported providers: {}.",
                    supported.join(", ")
                ))
            }
        }
    }
}

/// A non-empty access credential. Its `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(provider: ProviderId, value: Option<&str>) -> Result<Self, ConfigError> {
        match value.map(str::trim) {
            Some(v) if !v.is_empty() => Ok(Self(v.to_owned())),
            _ => Err(ConfigError::MissingCredential(provider.to_string())),
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Source of raw current-weather data for one fixed location.
///
/// Implementations keep no state between calls; caching belongs to
/// [`crate::cache::RefreshingObservationCache`].
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    fn id(&self) -> ProviderId;

    async fn fetch(&self) -> Result<RawObservation, FetchError>;
}

/// Construct a provider from config and explicit ProviderId.
pub fn provider_from_config(
    id: ProviderId,
    config: &Config,
) -> anyhow::Result<Arc<dyn WeatherProvider>> {
    let coordinates = config.coordinates()?;

    let provider: Arc<dyn WeatherProvider> = match id {
        ProviderId::OpenWeather => {
            let credential = Credential::new(id, config.provider_api_key(id))?;
            let mut provider = OpenWeatherProvider::new(coordinates, credential)?;
            if let Some(base_url) = config.provider_base_url(id) {
                provider = provider.with_base_url(base_url);
            }
            Arc::new(provider)
        }
        ProviderId::Fake => Arc::new(FakeProvider::new(coordinates)),
    };

    Ok(provider)
}

/// Construct the default provider from config, using `default_provider` field.
pub fn default_provider_from_config(config: &Config) -> anyhow::Result<Arc<dyn WeatherProvider>> {
    let id = config.default_provider_id()?;
    provider_from_config(id, config)
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
