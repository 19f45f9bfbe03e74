mod cli_options;
mod http_api_settings;

pub use cli_options::CliOptions;
pub use http_api_settings::HttpApiSettings;

use crate::model::EmailAddress;
use crate::services::CacheTtl;
use secrecy::{ExposeSecret, SecretString};
use serde_with::serde_as;
use settings_loader::common::database::DatabaseSettings;
use settings_loader::SettingsLoader;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    pub http_api: HttpApiSettings,
    pub database: DatabaseSettings,
    pub weather: WeatherSettings,
    pub notification: NotificationSettings,
}

impl SettingsLoader for Settings {
    type Options = CliOptions;
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WeatherSettings {
    #[serde(default)]
    pub cache: CacheTtl,

    pub open_weather: OpenWeatherSettings,
    pub geo_forecast: GeoForecastSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenWeatherSettings {
    pub base_url: String,
    pub api_key: SecretString,
}

impl PartialEq for OpenWeatherSettings {
    fn eq(&self, other: &Self) -> bool {
        self.base_url == other.base_url
            && self.api_key.expose_secret() == other.api_key.expose_secret()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeoForecastSettings {
    pub geocode_url: String,
    pub forecast_url: String,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationSettings {
    #[serde(default = "NotificationSettings::default_page_size")]
    pub page_size: u32,

    #[serde(default = "NotificationSettings::default_max_attempts")]
    pub max_attempts: u32,

    pub sender: EmailAddress,

    pub email: EmailApiSettings,

    #[serde(default = "NotificationSettings::default_hourly_period")]
    #[serde(alias = "hourly_period_secs")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub hourly_period: Duration,

    #[serde(default = "NotificationSettings::default_daily_period")]
    #[serde(alias = "daily_period_secs")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub daily_period: Duration,
}

impl NotificationSettings {
    const fn default_page_size() -> u32 {
        crate::model::subscription::DEFAULT_PAGE_SIZE
    }

    const fn default_max_attempts() -> u32 {
        crate::dispatch::DEFAULT_MAX_ATTEMPTS
    }

    const fn default_hourly_period() -> Duration {
        Duration::from_secs(60 * 60)
    }

    const fn default_daily_period() -> Duration {
        Duration::from_secs(24 * 60 * 60)
    }
}

impl PartialEq for NotificationSettings {
    fn eq(&self, other: &Self) -> bool {
        self.page_size == other.page_size
            && self.max_attempts == other.max_attempts
            && self.sender == other.sender
            && self.email == other.email
            && self.hourly_period == other.hourly_period
            && self.daily_period == other.daily_period
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailApiSettings {
    pub base_url: String,
    pub api_key: SecretString,
}

impl PartialEq for EmailApiSettings {
    fn eq(&self, other: &Self) -> bool {
        self.base_url == other.base_url
            && self.api_key.expose_secret() == other.api_key.expose_secret()
    }
}
