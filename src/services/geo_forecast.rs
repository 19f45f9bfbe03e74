pub use errors::GeoForecastError;

use super::WeatherApi;
use crate::errors::WeatherError;
use crate::model::{City, WeatherSnapshot};
use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use std::time;
use url::Url;

/// Two-step geocode + forecast source. The geocoder resolves a city name to
/// coordinates; the forecast endpoint resolves coordinates to current
/// conditions. An empty geocode result set is a definitive miss for the city.
#[derive(Debug, Clone)]
pub struct GeoForecastApi {
    client: ClientWithMiddleware,
    geocode_url: Url,
    forecast_url: Url,
}

impl GeoForecastApi {
    pub fn new(
        geocode_url: impl Into<Url>, forecast_url: impl Into<Url>,
    ) -> Result<Self, GeoForecastError> {
        let geocode_url = geocode_url.into();
        if geocode_url.cannot_be_a_base() {
            return Err(GeoForecastError::NotABaseUrl(geocode_url));
        }
        let forecast_url = forecast_url.into();
        if forecast_url.cannot_be_a_base() {
            return Err(GeoForecastError::NotABaseUrl(forecast_url));
        }

        let client = Self::make_http_client()?;
        Ok(Self { client, geocode_url, forecast_url })
    }

    fn make_http_client() -> Result<ClientWithMiddleware, GeoForecastError> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(time::Duration::from_secs(60))
            .pool_max_idle_per_host(5)
            .build()?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(
                time::Duration::from_millis(1_000),
                time::Duration::from_secs(300),
            )
            .build_with_max_retries(3);

        Ok(reqwest_middleware::ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build())
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn geocode(&self, city: &City) -> Result<GeoMatch, GeoForecastError> {
        let mut url = self.geocode_url.clone();
        url.path_segments_mut().unwrap().push("v1").push("search");
        url.query_pairs_mut()
            .append_pair("name", city.as_str())
            .append_pair("count", "1");

        let response = self.client.get(url).send().await?;
        let payload: GeocodeResults = response.error_for_status()?.json().await?;
        payload
            .results
            .into_iter()
            .flatten()
            .next()
            .ok_or_else(|| GeoForecastError::UnknownCity(city.clone()))
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn current_forecast(&self, point: &GeoMatch) -> Result<WeatherSnapshot, GeoForecastError> {
        let mut url = self.forecast_url.clone();
        url.path_segments_mut().unwrap().push("v1").push("forecast");
        url.query_pairs_mut()
            .append_pair("latitude", &point.latitude.to_string())
            .append_pair("longitude", &point.longitude.to_string())
            .append_pair(
                "current",
                "temperature_2m,relative_humidity_2m,weather_code",
            );

        let response = self.client.get(url).send().await?;
        let payload: ForecastEnvelope = response.error_for_status()?.json().await?;
        Ok(payload.current.into())
    }
}

#[async_trait]
impl WeatherApi for GeoForecastApi {
    #[instrument(level = "debug", skip(self), err)]
    async fn weather_for_city(&self, city: &City) -> Result<WeatherSnapshot, WeatherError> {
        let point = self.geocode(city).await.map_err(|err| match err {
            GeoForecastError::UnknownCity(city) => WeatherError::CityNotFound(city),
            other => WeatherError::upstream(other),
        })?;

        self.current_forecast(&point).await.map_err(WeatherError::upstream)
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn validate_city(&self, city: &City) -> Result<(), WeatherError> {
        self.geocode(city).await.map(|_| ()).map_err(|err| match err {
            GeoForecastError::UnknownCity(city) => WeatherError::InvalidCity {
                city,
                reason: "geocoder found no match for city".to_string(),
            },
            other => WeatherError::upstream(other),
        })
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResults {
    results: Option<Vec<GeoMatch>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct GeoMatch {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct ForecastEnvelope {
    current: CurrentReading,
}

#[derive(Debug, Deserialize)]
struct CurrentReading {
    temperature_2m: f64,
    relative_humidity_2m: f64,
    weather_code: u8,
}

impl From<CurrentReading> for WeatherSnapshot {
    fn from(reading: CurrentReading) -> Self {
        Self {
            temperature_c: reading.temperature_2m,
            humidity_pct: reading.relative_humidity_2m,
            description: describe_weather_code(reading.weather_code).to_string(),
        }
    }
}

/// WMO weather interpretation codes, collapsed to subscriber-facing phrases.
fn describe_weather_code(code: u8) -> &'static str {
    match code {
        0 => "clear sky",
        1..=3 => "partly cloudy",
        45 | 48 => "fog",
        51..=57 => "drizzle",
        61..=67 => "rain",
        71..=77 => "snow",
        80..=82 => "rain showers",
        85 | 86 => "snow showers",
        95..=99 => "thunderstorm",
        _ => "unsettled",
    }
}

mod errors {
    use crate::model::City;
    use thiserror::Error;
    use url::Url;

    #[derive(Debug, Error)]
    pub enum GeoForecastError {
        #[error("supplied geo forecast API url is not a base url to query: {0}")]
        NotABaseUrl(Url),

        #[error("geocoder found no match for city: {0}")]
        UnknownCity(City),

        #[error("geo forecast API call failed: {0}")]
        HttpRequest(#[from] reqwest::Error),

        #[error("error occurred in HTTP middleware calling geo forecast API: {0}")]
        HttpMiddleware(#[from] reqwest_middleware::Error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::assert_ok;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_geocode_results_deser() {
        let payload = r##"{
            "results": [
                {"id": 703448, "name": "Kyiv", "latitude": 50.45466, "longitude": 30.5238}
            ],
            "generationtime_ms": 0.6
        }"##;

        let results: GeocodeResults = assert_ok!(serde_json::from_str(payload));
        let top = results.results.into_iter().flatten().next();
        assert_eq!(
            top,
            Some(GeoMatch { latitude: 50.45466, longitude: 30.5238 })
        );
    }

    #[test]
    fn test_geocode_no_results() {
        let payload = r##"{ "generationtime_ms": 0.2 }"##;
        let results: GeocodeResults = assert_ok!(serde_json::from_str(payload));
        assert_eq!(results.results.into_iter().flatten().next(), None);
    }

    #[test]
    fn test_forecast_envelope_deser() {
        let payload = r##"{
            "current": {
                "time": "2026-08-30T09:00",
                "temperature_2m": 21.7,
                "relative_humidity_2m": 58,
                "weather_code": 61
            }
        }"##;

        let envelope: ForecastEnvelope = assert_ok!(serde_json::from_str(payload));
        let snapshot = WeatherSnapshot::from(envelope.current);
        assert_eq!(
            snapshot,
            WeatherSnapshot {
                temperature_c: 21.7,
                humidity_pct: 58.0,
                description: "rain".to_string(),
            }
        );
    }
}
