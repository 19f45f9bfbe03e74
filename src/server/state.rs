use crate::dispatch::{DispatcherConfig, NotificationDispatcher};
use crate::model::subscription::PostgresSubscriptionStore;
use crate::server::api_errors::ApiBootstrapError;
use crate::server::get_connection_pool;
use crate::services::{
    CacheAsideProxy, CacheServices, EmailServices, FallbackChainResolver, GeoForecastApi,
    HttpEmailApi, OpenWeatherApi, PgCacheStore, WeatherSources,
};
use crate::Settings;
use axum::extract::FromRef;
use sqlx::PgPool;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

/// Weather lookup stack used everywhere in the application: a provider
/// fallback chain behind the cache-aside proxy.
pub type WeatherResolverStack = CacheAsideProxy<FallbackChainResolver<WeatherSources>, CacheServices>;

pub type Dispatcher =
    NotificationDispatcher<PostgresSubscriptionStore, WeatherResolverStack, EmailServices>;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub subscriptions: Arc<PostgresSubscriptionStore>,
    pub weather: Arc<WeatherResolverStack>,
    pub db_pool: PgPool,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish()
    }
}

impl FromRef<AppState> for Arc<Dispatcher> {
    fn from_ref(app: &AppState) -> Self {
        app.dispatcher.clone()
    }
}

impl FromRef<AppState> for Arc<PostgresSubscriptionStore> {
    fn from_ref(app: &AppState) -> Self {
        app.subscriptions.clone()
    }
}

impl FromRef<AppState> for Arc<WeatherResolverStack> {
    fn from_ref(app: &AppState) -> Self {
        app.weather.clone()
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(app: &AppState) -> Self {
        app.db_pool.clone()
    }
}

impl AppState {
    #[instrument(level = "debug", skip(settings), err)]
    pub async fn new(settings: &Settings) -> Result<AppState, ApiBootstrapError> {
        info!(?settings, "creating application state");
        let db_pool = get_connection_pool(&settings.database);

        // -- Weather resolution --
        let open_weather = OpenWeatherApi::new(
            Url::from_str(&settings.weather.open_weather.base_url)?,
            settings.weather.open_weather.api_key.clone(),
        )?;
        let geo_forecast = GeoForecastApi::new(
            Url::from_str(&settings.weather.geo_forecast.geocode_url)?,
            Url::from_str(&settings.weather.geo_forecast.forecast_url)?,
        )?;
        let chain = FallbackChainResolver::new(vec![
            WeatherSources::OpenWeather(open_weather),
            WeatherSources::GeoForecast(geo_forecast),
        ]);
        let cache = CacheServices::Postgres(PgCacheStore::new(db_pool.clone()));
        let weather = Arc::new(CacheAsideProxy::new(
            chain,
            cache,
            settings.weather.cache.clone(),
        ));
        // -- Weather resolution --

        // -- Subscriptions --
        let subscriptions = Arc::new(PostgresSubscriptionStore::new(db_pool.clone()));
        // -- Subscriptions --

        // -- Notification dispatch --
        let email = Arc::new(EmailServices::Http(HttpEmailApi::new(
            Url::from_str(&settings.notification.email.base_url)?,
            settings.notification.email.api_key.clone(),
            settings.notification.sender.clone(),
        )?));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            subscriptions.clone(),
            weather.clone(),
            email,
            DispatcherConfig {
                page_size: settings.notification.page_size,
                max_attempts: settings.notification.max_attempts,
            },
        ));
        // -- Notification dispatch --

        Ok(AppState { dispatcher, subscriptions, weather, db_pool })
    }
}
