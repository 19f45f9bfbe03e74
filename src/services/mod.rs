pub mod cache;
pub mod email;
mod geo_forecast;
mod open_weather;
mod resolver;

pub use cache::{
    CacheAsideProxy, CacheError, CacheServices, CacheStore, CacheTtl, InMemoryCacheStore,
    PgCacheStore,
};
pub use email::{EmailApi, EmailError, EmailServices, HappyPathEmailApi, HttpEmailApi};
pub use geo_forecast::{GeoForecastApi, GeoForecastError};
pub use open_weather::{OpenWeatherApi, OpenWeatherError};
pub use resolver::FallbackChainResolver;

use crate::errors::WeatherError;
use crate::model::{City, WeatherSnapshot};
use async_trait::async_trait;

/// Capability of one weather data source: resolve current conditions for a
/// city and check that the city is known at all. Each implementation is
/// independently fallible.
#[async_trait]
pub trait WeatherApi: Send + Sync {
    async fn weather_for_city(&self, city: &City) -> Result<WeatherSnapshot, WeatherError>;

    async fn validate_city(&self, city: &City) -> Result<(), WeatherError>;
}

#[async_trait]
impl<T: WeatherApi + ?Sized> WeatherApi for std::sync::Arc<T> {
    async fn weather_for_city(&self, city: &City) -> Result<WeatherSnapshot, WeatherError> {
        (**self).weather_for_city(city).await
    }

    async fn validate_city(&self, city: &City) -> Result<(), WeatherError> {
        (**self).validate_city(city).await
    }
}

#[derive(Debug, Clone)]
pub enum WeatherSources {
    OpenWeather(OpenWeatherApi),
    GeoForecast(GeoForecastApi),
    HappyPath(HappyPathWeatherApi),
}

#[async_trait]
impl WeatherApi for WeatherSources {
    async fn weather_for_city(&self, city: &City) -> Result<WeatherSnapshot, WeatherError> {
        match self {
            Self::OpenWeather(svc) => svc.weather_for_city(city).await,
            Self::GeoForecast(svc) => svc.weather_for_city(city).await,
            Self::HappyPath(svc) => svc.weather_for_city(city).await,
        }
    }

    async fn validate_city(&self, city: &City) -> Result<(), WeatherError> {
        match self {
            Self::OpenWeather(svc) => svc.validate_city(city).await,
            Self::GeoForecast(svc) => svc.validate_city(city).await,
            Self::HappyPath(svc) => svc.validate_city(city).await,
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct HappyPathWeatherApi;

#[async_trait]
impl WeatherApi for HappyPathWeatherApi {
    async fn weather_for_city(&self, _city: &City) -> Result<WeatherSnapshot, WeatherError> {
        Ok(WeatherSnapshot {
            temperature_c: 18.3,
            humidity_pct: 62.0,
            description: "partly cloudy".to_string(),
        })
    }

    async fn validate_city(&self, _city: &City) -> Result<(), WeatherError> {
        Ok(())
    }
}
