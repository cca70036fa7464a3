//! Core library for the `weatherpoint` service.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Abstraction over weather providers (OpenWeatherMap, fake)
//! - The throttled observation cache that decides when a provider is called
//! - Shared domain models (observations, the JSON view)
//!
//! It is used by `weatherpoint-cli`, but can also be reused by other binaries or services.

pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod provider;

pub use cache::{RefreshStatus, RefreshingObservationCache, Snapshot};
pub use config::{Config, LocationConfig, ProviderConfig};
pub use error::{ConfigError, FetchError};
pub use model::{Coordinates, CurrentWeather, Location, Observation, RawObservation};
pub use provider::{Credential, ProviderId, WeatherProvider};
