use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const KELVIN_OFFSET: f64 = 273.15;
const HPA_PER_ATM_UNIT: f64 = 1.33322;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

/// A validated point on the globe. The only way to get one is through [`Coordinates::new`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    lat: f64,
    lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Result<Self, ConfigError> {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(ConfigError::InvalidLatitude(lat));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(ConfigError::InvalidLongitude(lon));
        }

        Ok(Self { lat, lon })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }
}

impl From<Coordinates> for Location {
    fn from(c: Coordinates) -> Self {
        Location { lat: c.lat, lon: c.lon }
    }
}

/// Provider output in provider units, before any conversion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawObservation {
    pub location: Option<Location>,
    pub title: Option<String>,
    pub observed_at: Option<DateTime<FixedOffset>>,
    pub temperature_k: Option<f64>,
    pub humidity_percent: Option<f64>,
    pub pressure_hpa: Option<f64>,
}

/// One immutable snapshot of the weather at the configured point.
///
/// Every field may be absent: nothing fetched yet, or the provider left it out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    pub location: Option<Location>,
    pub title: Option<String>,
    pub observed_at: Option<DateTime<FixedOffset>>,
    pub temperature_c: Option<f64>,
    pub humidity_percent: Option<f64>,
    pub pressure_atm: Option<i64>,
}

impl Observation {
    /// True when no field is known. A successful fetch may still produce this.
    pub fn is_empty(&self) -> bool {
        *self == Observation::default()
    }
}

impl From<RawObservation> for Observation {
    fn from(raw: RawObservation) -> Self {
        Self {
            location: raw.location,
            title: raw.title,
            observed_at: raw.observed_at,
            temperature_c: raw.temperature_k.map(kelvin_to_celsius),
            humidity_percent: raw.humidity_percent,
            pressure_atm: raw.pressure_hpa.map(hpa_to_atm_units),
        }
    }
}

pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - KELVIN_OFFSET
}

/// Converts hPa into the service's pressure unit, rounded to the nearest integer.
pub fn hpa_to_atm_units(hpa: f64) -> i64 {
    (hpa / HPA_PER_ATM_UNIT).round() as i64
}

pub fn celsius_to_kelvin(celsius: f64) -> f64 {
    celsius + KELVIN_OFFSET
}

pub fn atm_units_to_hpa(atm: f64) -> f64 {
    atm * HPA_PER_ATM_UNIT
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Temperature {
    #[serde(rename = "C")]
    pub celsius: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Humidity {
    pub percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pressure {
    pub atm: Option<i64>,
}

/// JSON shape served at `/weather/current`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentWeather {
    pub location: Option<Location>,
    pub title: Option<String>,
    pub timestamp: Option<String>,
    pub temperature: Temperature,
    pub humidity: Humidity,
    pub pressure: Pressure,
}

impl From<&Observation> for CurrentWeather {
    fn from(o: &Observation) -> Self {
        Self {
            location: o.location,
            title: o.title.clone(),
            timestamp: o.observed_at.map(|dt| dt.to_rfc3339()),
            temperature: Temperature { celsius: o.temperature_c },
            humidity: Humidity { percent: o.humidity_percent },
            pressure: Pressure { atm: o.pressure_atm },
        }
    }
}
