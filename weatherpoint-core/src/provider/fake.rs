use async_trait::async_trait;
use chrono::Utc;

use crate::{
    error::FetchError,
    model::{Coordinates, RawObservation, atm_units_to_hpa, celsius_to_kelvin},
};

use super::{ProviderId, WeatherProvider};

pub const FAKE_TITLE: &str = "Fake place";

/// Random but plausible readings for demos and local runs. Never fails.
#[derive(Debug, Clone)]
pub struct FakeProvider {
    coordinates: Coordinates,
}

impl FakeProvider {
    pub fn new(coordinates: Coordinates) -> Self {
        tracing::info!(
            lat = coordinates.lat(),
            lon = coordinates.lon(),
            "FakeProvider created"
        );
        Self { coordinates }
    }
}

#[async_trait]
impl WeatherProvider for FakeProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Fake
    }

    async fn fetch(&self) -> Result<RawObservation, FetchError> {
        let temp_c = fastrand::i32(-40..=40) as f64 + fastrand::f64();
        let pressure_atm = fastrand::i32(700..=800) as f64;

        Ok(RawObservation {
            location: Some(self.coordinates.into()),
            title: Some(FAKE_TITLE.to_string()),
            observed_at: Some(Utc::now().fixed_offset()),
            temperature_k: Some(celsius_to_kelvin(temp_c)),
            humidity_percent: Some(fastrand::u8(0..=100) as f64),
            pressure_hpa: Some(atm_units_to_hpa(pressure_atm)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Observation;

    #[tokio::test]
    async fn readings_are_within_plausible_ranges() {
        let coords = Coordinates::new(10.0, 20.0).unwrap();
        let provider = FakeProvider::new(coords);

        for _ in 0..100 {
            let obs = Observation::from(provider.fetch().await.expect("fake never fails"));

            assert_eq!(obs.location, Some(coords.into()));
            assert_eq!(obs.title.as_deref(), Some(FAKE_TITLE));
            assert!(obs.observed_at.is_some());

            let t = obs.temperature_c.unwrap();
            assert!((-40.0..=41.0).contains(&t), "temperature {t}");
            let h = obs.humidity_percent.unwrap();
            assert!((0.0..=100.0).contains(&h), "humidity {h}");
            let p = obs.pressure_atm.unwrap();
            assert!((700..=800).contains(&p), "pressure {p}");
        }
    }
}
