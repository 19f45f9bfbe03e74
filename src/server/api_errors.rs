use thiserror::Error;

#[derive(Debug, Error, ToSchema)]
pub enum ApiError {
    #[error("failed to bootstrap server API: {0}")]
    Bootstrap(#[from] ApiBootstrapError),

    #[error("weather resolution failed: {0}")]
    Weather(#[from] crate::errors::WeatherError),

    #[error("subscription operation failed: {0}")]
    Subscription(#[from] crate::model::subscription::SubscriptionError),

    #[error("invalid subscriber email address: {0}")]
    InvalidEmail(String),

    #[error("Invalid URL path input: {0}")]
    Path(#[from] axum::extract::rejection::PathRejection),

    #[error("Invalid JSON payload: {0}")]
    Json(#[from] axum::extract::rejection::JsonRejection),

    #[error("HTTP engine error: {0}")]
    HttpEngine(#[from] hyper::Error),

    #[error("failed database operation: {0} ")]
    Sql(#[from] sqlx::Error),

    #[error("failed joining with thread: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("{0}")]
    IO(#[from] std::io::Error),
}

#[derive(Debug, Error, ToSchema)]
pub enum ApiBootstrapError {
    #[error("failed to set up OpenWeather source: {0}")]
    OpenWeather(#[from] crate::services::OpenWeatherError),

    #[error("failed to set up geocoded forecast source: {0}")]
    GeoForecast(#[from] crate::services::GeoForecastError),

    #[error("failed to set up email delivery service: {0}")]
    Email(#[from] crate::services::EmailError),

    #[error("{0}")]
    ParseUrl(#[from] url::ParseError),

    #[error("{0}")]
    IO(#[from] std::io::Error),
}
