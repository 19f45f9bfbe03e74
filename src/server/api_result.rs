use crate::errors::WeatherError;
use crate::model::subscription::SubscriptionError;
use crate::server::api_errors::ApiError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::borrow::Cow;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error=?self, "responding with ERROR");
        let error: anyhow::Error = self.into();
        HttpError::from(error).into_response()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub error: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backtrace: Option<String>,
}

impl From<anyhow::Error> for ErrorReport {
    fn from(error: anyhow::Error) -> Self {
        Self {
            error: error.to_string(),
            error_code: None,
            backtrace: Some(error.backtrace().to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum HttpError {
    BadRequest { error: ErrorReport },
    NotFound { message: Cow<'static, str> },
    Conflict { error: ErrorReport },
    Internal { error: ErrorReport },
}

impl From<anyhow::Error> for HttpError {
    fn from(error: anyhow::Error) -> Self {
        error!("HTTP handler error: {error:?}");
        match error.downcast_ref::<ApiError>() {
            Some(ApiError::Path(_) | ApiError::Json(_) | ApiError::InvalidEmail(_)) => {
                Self::BadRequest { error: error.into() }
            },
            Some(ApiError::Weather(
                WeatherError::CityNotFound(_) | WeatherError::InvalidCity { .. },
            )) => Self::BadRequest { error: error.into() },
            Some(ApiError::Subscription(SubscriptionError::AlreadyExists(_))) => {
                Self::Conflict { error: error.into() }
            },
            Some(ApiError::Subscription(SubscriptionError::NotFound(id))) => Self::NotFound {
                message: format!("no subscription found for identifier: {id}").into(),
            },
            Some(
                ApiError::Weather(_)
                | ApiError::Subscription(_)
                | ApiError::HttpEngine(_)
                | ApiError::IO(_)
                | ApiError::Sql(_)
                | ApiError::TaskJoin(_)
                | ApiError::Bootstrap(_),
            )
            | None => Self::Internal { error: error.into() },
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound { message } => (StatusCode::NOT_FOUND, Json(message)).into_response(),
            Self::BadRequest { error } => (StatusCode::BAD_REQUEST, Json(error)).into_response(),
            Self::Conflict { error } => (StatusCode::CONFLICT, Json(error)).into_response(),
            Self::Internal { error } => {
                (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response()
            },
        }
    }
}
