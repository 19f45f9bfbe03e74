pub use errors::OpenWeatherError;

use super::WeatherApi;
use crate::errors::WeatherError;
use crate::model::{City, WeatherSnapshot};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use secrecy::{ExposeSecret, SecretString};
use std::time;
use url::Url;

/// Keyed commercial current-conditions API. One call resolves a city by name;
/// an unknown city is reported with HTTP 404, which is a definitive answer
/// rather than an outage.
#[derive(Debug, Clone)]
pub struct OpenWeatherApi {
    client: ClientWithMiddleware,
    base_url: Url,
    api_key: SecretString,
}

impl OpenWeatherApi {
    pub fn new(
        base_url: impl Into<Url>, api_key: SecretString,
    ) -> Result<Self, OpenWeatherError> {
        let base_url = base_url.into();
        if base_url.cannot_be_a_base() {
            return Err(OpenWeatherError::NotABaseUrl(base_url));
        }

        let client = Self::make_http_client()?;
        Ok(Self { client, base_url, api_key })
    }

    fn make_http_client() -> Result<ClientWithMiddleware, OpenWeatherError> {
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
    async fn current_conditions(&self, city: &City) -> Result<WeatherSnapshot, OpenWeatherError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .unwrap()
            .push("data")
            .push("2.5")
            .push("weather");
        url.query_pairs_mut()
            .append_pair("q", city.as_str())
            .append_pair("units", "metric")
            .append_pair("appid", self.api_key.expose_secret());

        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(OpenWeatherError::UnknownCity(city.clone()));
        }

        let payload: CurrentConditions = response.error_for_status()?.json().await?;
        Ok(payload.into())
    }
}

#[async_trait]
impl WeatherApi for OpenWeatherApi {
    #[instrument(level = "debug", skip(self), err)]
    async fn weather_for_city(&self, city: &City) -> Result<WeatherSnapshot, WeatherError> {
        self.current_conditions(city).await.map_err(|err| match err {
            OpenWeatherError::UnknownCity(city) => WeatherError::CityNotFound(city),
            other => WeatherError::upstream(other),
        })
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn validate_city(&self, city: &City) -> Result<(), WeatherError> {
        self.current_conditions(city).await.map(|_| ()).map_err(|err| match err {
            OpenWeatherError::UnknownCity(city) => WeatherError::InvalidCity {
                city,
                reason: "city is not known to the provider".to_string(),
            },
            other => WeatherError::upstream(other),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    main: ConditionReadings,
    #[serde(default)]
    weather: Vec<ConditionSummary>,
}

#[derive(Debug, Deserialize)]
struct ConditionReadings {
    temp: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct ConditionSummary {
    description: String,
}

impl From<CurrentConditions> for WeatherSnapshot {
    fn from(conditions: CurrentConditions) -> Self {
        let description = conditions
            .weather
            .into_iter()
            .next()
            .map(|summary| summary.description)
            .unwrap_or_default();

        Self {
            temperature_c: conditions.main.temp,
            humidity_pct: conditions.main.humidity,
            description,
        }
    }
}

mod errors {
    use crate::model::City;
    use thiserror::Error;
    use url::Url;

    #[derive(Debug, Error)]
    pub enum OpenWeatherError {
        #[error("supplied weather API url is not a base url to query: {0}")]
        NotABaseUrl(Url),

        #[error("weather provider does not know city: {0}")]
        UnknownCity(City),

        #[error("weather API call failed: {0}")]
        HttpRequest(#[from] reqwest::Error),

        #[error("error occurred in HTTP middleware calling weather API: {0}")]
        HttpMiddleware(#[from] reqwest_middleware::Error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::assert_ok;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_current_conditions_deser() {
        let payload = r##"{
            "weather": [{"id": 500, "main": "Rain", "description": "light rain", "icon": "10d"}],
            "main": {"temp": 11.4, "feels_like": 10.8, "pressure": 1012, "humidity": 81},
            "name": "Kyiv"
        }"##;

        let conditions: CurrentConditions = assert_ok!(serde_json::from_str(payload));
        let snapshot = WeatherSnapshot::from(conditions);
        assert_eq!(
            snapshot,
            WeatherSnapshot {
                temperature_c: 11.4,
                humidity_pct: 81.0,
                description: "light rain".to_string(),
            }
        );
    }

    #[test]
    fn test_current_conditions_without_summary() {
        let payload = r##"{ "main": {"temp": -3.0, "humidity": 55} }"##;
        let conditions: CurrentConditions = assert_ok!(serde_json::from_str(payload));
        let snapshot = WeatherSnapshot::from(conditions);
        assert_eq!(snapshot.description, "");
        assert_eq!(snapshot.humidity_pct, 55.0);
    }
}
