use crate::errors::WeatherError;
use crate::model::{City, WeatherSnapshot};
use crate::services::WeatherApi;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Shareable resolution failure. `Shared` futures hand every waiter a clone
/// of the result, so the underlying error is reference-counted.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct LoadFailure(Arc<WeatherError>);

impl LoadFailure {
    pub fn weather_error(&self) -> &WeatherError {
        &self.0
    }
}

impl From<WeatherError> for LoadFailure {
    fn from(error: WeatherError) -> Self {
        Self(Arc::new(error))
    }
}

type SharedLoad = Shared<BoxFuture<'static, Result<WeatherSnapshot, LoadFailure>>>;

/// Per-run memoization of city weather lookups.
///
/// The first `load` for a city starts exactly one resolution through the
/// wrapped resolver; concurrent callers for the same city share the pending
/// future instead of issuing duplicate calls, while distinct cities resolve
/// independently. The table lives only as long as the run that owns it; a new
/// run starts empty.
#[derive(Debug)]
pub struct RunWeatherLoader<R> {
    resolver: Arc<R>,
    inflight: Mutex<HashMap<City, SharedLoad>>,
}

impl<R> RunWeatherLoader<R>
where
    R: WeatherApi + 'static,
{
    pub fn new(resolver: Arc<R>) -> Self {
        Self { resolver, inflight: Mutex::new(HashMap::new()) }
    }

    #[instrument(level = "trace", skip(self))]
    pub async fn load(&self, city: &City) -> Result<WeatherSnapshot, LoadFailure> {
        let load = {
            let mut inflight = self.inflight.lock().unwrap();
            match inflight.get(city) {
                Some(pending) => pending.clone(),
                None => {
                    let resolver = Arc::clone(&self.resolver);
                    let city_key = city.clone();
                    let load = async move {
                        resolver
                            .weather_for_city(&city_key)
                            .await
                            .map_err(LoadFailure::from)
                    }
                    .boxed()
                    .shared();

                    inflight.insert(city.clone(), load.clone());
                    load
                },
            }
        };

        load.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingWeatherApi, ScriptedOutcome, ScriptedSource};
    use claims::{assert_matches, assert_ok};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_same_city_resolves_once() {
        once_cell::sync::Lazy::force(&crate::setup_tracing::TEST_TRACING);
        let resolver = Arc::new(CountingWeatherApi::with_delay(Duration::from_millis(20)));
        let loader = RunWeatherLoader::new(Arc::clone(&resolver));
        let city = City::new("kyiv");

        let loads = (0..8).map(|_| loader.load(&city));
        let results = futures::future::join_all(loads).await;
        for result in results {
            assert_ok!(result);
        }

        assert_eq!(resolver.resolutions_for(&city), 1);
    }

    #[tokio::test]
    async fn test_distinct_cities_resolve_independently() {
        once_cell::sync::Lazy::force(&crate::setup_tracing::TEST_TRACING);
        let resolver = Arc::new(CountingWeatherApi::new());
        let loader = RunWeatherLoader::new(Arc::clone(&resolver));
        let kyiv = City::new("kyiv");
        let lviv = City::new("lviv");

        let (kyiv_weather, lviv_weather) =
            futures::future::join(loader.load(&kyiv), loader.load(&lviv)).await;
        assert_ok!(kyiv_weather);
        assert_ok!(lviv_weather);

        assert_eq!(resolver.resolutions_for(&kyiv), 1);
        assert_eq!(resolver.resolutions_for(&lviv), 1);
        assert_eq!(resolver.total_resolutions(), 2);
    }

    #[tokio::test]
    async fn test_failure_memoized_for_run_lifetime() {
        once_cell::sync::Lazy::force(&crate::setup_tracing::TEST_TRACING);
        let source = ScriptedSource::new(ScriptedOutcome::Upstream);
        let calls = source.call_count_handle();
        let loader = RunWeatherLoader::new(Arc::new(source));
        let city = City::new("kyiv");

        let first = loader.load(&city).await.unwrap_err();
        assert_matches!(first.weather_error(), WeatherError::Upstream { .. });
        let second = loader.load(&city).await.unwrap_err();
        assert_matches!(second.weather_error(), WeatherError::Upstream { .. });

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_new_run_starts_with_empty_table() {
        once_cell::sync::Lazy::force(&crate::setup_tracing::TEST_TRACING);
        let resolver = Arc::new(CountingWeatherApi::new());
        let city = City::new("kyiv");

        {
            let loader = RunWeatherLoader::new(Arc::clone(&resolver));
            assert_ok!(loader.load(&city).await);
        }
        {
            let loader = RunWeatherLoader::new(Arc::clone(&resolver));
            assert_ok!(loader.load(&city).await);
        }

        assert_eq!(resolver.resolutions_for(&city), 2);
    }
}
