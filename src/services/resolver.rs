use super::WeatherApi;
use crate::errors::WeatherError;
use crate::model::{City, WeatherSnapshot};
use async_trait::async_trait;

/// Composes an ordered list of weather sources into one resolver.
///
/// Sources are consulted in list order. A definitive error (`CityNotFound`,
/// `InvalidCity`) aborts the chain immediately: falling back could mask a
/// legitimately nonexistent city behind a source that "succeeds" by resolving
/// a different, wrong city. An infrastructure failure falls through to the
/// next source. Exhausting every source without a success or a definitive
/// answer surfaces `SourcesExhausted`.
#[derive(Debug, Clone)]
pub struct FallbackChainResolver<S> {
    sources: Vec<S>,
}

impl<S> FallbackChainResolver<S> {
    pub fn new(sources: Vec<S>) -> Self {
        debug_assert!(!sources.is_empty(), "provider chain requires at least one source");
        Self { sources }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl<S: WeatherApi> WeatherApi for FallbackChainResolver<S> {
    #[instrument(level = "debug", skip(self), err)]
    async fn weather_for_city(&self, city: &City) -> Result<WeatherSnapshot, WeatherError> {
        for (position, source) in self.sources.iter().enumerate() {
            match source.weather_for_city(city).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(error) if error.is_definitive() => return Err(error),
                Err(error) => {
                    warn!(%city, position, "weather source failed, falling back: {error}");
                },
            }
        }

        Err(WeatherError::SourcesExhausted)
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn validate_city(&self, city: &City) -> Result<(), WeatherError> {
        for (position, source) in self.sources.iter().enumerate() {
            match source.validate_city(city).await {
                Ok(()) => return Ok(()),
                Err(error) if error.is_definitive() => return Err(error),
                Err(error) => {
                    warn!(%city, position, "city validation source failed, falling back: {error}");
                },
            }
        }

        Err(WeatherError::SourcesExhausted)
    }
}
