use crate::model::subscription::PostgresSubscriptionStore;
use crate::model::{
    City, EmailAddress, NewSubscription, NotificationFrequency, Subscription, SubscriptionId,
    SubscriptionStore,
};
use crate::server::api_errors::ApiError;
use crate::server::state::{AppState, WeatherResolverStack};
use crate::services::WeatherApi;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{routing, Json, Router};
use std::sync::Arc;

#[derive(OpenApi)]
#[openapi(
paths(create_subscription, delete_subscription),
components(
schemas(
SubscribeRequest, Subscription, SubscriptionId, City, NotificationFrequency,
crate::errors::WeatherError, ApiError,
)
),
tags((name = "subscription", description = "Weather subscription API"))
)]
pub struct SubscriptionApiDoc;

pub fn api() -> Router<AppState> {
    Router::new()
        .route("/", routing::post(create_subscription))
        .route("/:subscription_id", routing::delete(delete_subscription))
}

#[derive(Debug, Clone, PartialEq, ToSchema, Deserialize)]
pub struct SubscribeRequest {
    pub email: String,
    pub city: City,
    pub frequency: NotificationFrequency,
}

#[utoipa::path(
post,
path = "/",
context_path = "/api/v1/subscriptions",
tag = "subscription",
request_body = SubscribeRequest,
responses(
(status = 201, description = "subscription created", body = Subscription),
(status = 400, description = "malformed email or unknown city"),
(status = 409, description = "an active subscription already exists for the email"),
(status = "5XX", description = "server error", body = ApiError),
),
)]
#[axum::debug_handler(state = AppState)]
#[instrument(level = "debug", skip(subscriptions, weather), err)]
async fn create_subscription(
    State(subscriptions): State<Arc<PostgresSubscriptionStore>>,
    State(weather): State<Arc<WeatherResolverStack>>, Json(request): Json<SubscribeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = EmailAddress::parse(request.email).map_err(ApiError::InvalidEmail)?;
    weather.validate_city(&request.city).await?;

    let subscription = subscriptions
        .create(NewSubscription { email, city: request.city, frequency: request.frequency })
        .await?;

    Ok((StatusCode::CREATED, Json(subscription)))
}

#[utoipa::path(
delete,
path = "/{subscription_id}",
context_path = "/api/v1/subscriptions",
tag = "subscription",
params(
("subscription_id" = String, Path, description = "Subscription identifier"),
),
responses(
(status = 204, description = "subscription removed"),
(status = 404, description = "no subscription found for identifier"),
)
)]
#[axum::debug_handler(state = AppState)]
#[instrument(level = "debug", skip(subscriptions), err)]
async fn delete_subscription(
    Path(subscription_id): Path<SubscriptionId>,
    State(subscriptions): State<Arc<PostgresSubscriptionStore>>,
) -> Result<StatusCode, ApiError> {
    let removed = subscriptions.remove_by_id(&subscription_id).await?;
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(crate::model::subscription::SubscriptionError::NotFound(subscription_id).into())
    }
}
