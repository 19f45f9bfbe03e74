#[macro_use]
extern crate serde;

#[macro_use]
extern crate tracing;

#[macro_use]
extern crate utoipa;

pub mod dispatch;
pub mod model;
mod postgres;
pub mod server;
pub mod services;
mod settings;
pub mod setup_tracing;

#[cfg(test)]
pub mod testing;

pub use settings::{CliOptions, NotificationSettings, Settings};

pub mod errors {
    use crate::model::City;
    use thiserror::Error;

    pub type BoxDynError = Box<dyn std::error::Error + 'static + Send + Sync>;

    /// Failure taxonomy for resolving weather for a city.
    ///
    /// `CityNotFound` and `InvalidCity` are *definitive*: the city's status is
    /// conclusively known and consulting another source cannot change it.
    /// `Upstream` is an infrastructure failure of one source and is eligible
    /// for fallback within a provider chain.
    #[derive(Debug, ToSchema, Error)]
    #[non_exhaustive]
    pub enum WeatherError {
        #[error("no weather source could resolve city: {0}")]
        CityNotFound(City),

        #[error("city failed validation: {city}: {reason}")]
        InvalidCity { city: City, reason: String },

        #[error("weather source upstream failure: {source}")]
        Upstream {
            #[source]
            source: BoxDynError,
        },

        #[error("failed to execute chain of weather providers")]
        SourcesExhausted,
    }

    impl WeatherError {
        pub fn upstream(source: impl Into<BoxDynError>) -> Self {
            Self::Upstream { source: source.into() }
        }

        /// Whether the chain should stop falling back on this error.
        pub const fn is_definitive(&self) -> bool {
            matches!(self, Self::CityNotFound(_) | Self::InvalidCity { .. })
        }
    }
}

pub(crate) async fn shutdown() {
    tokio::signal::ctrl_c().await.expect("failed to listen for signal event");
}
