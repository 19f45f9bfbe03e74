use crate::dispatch::RunOutcome;
use crate::model::NotificationFrequency;
use crate::server::api_errors::ApiError;
use crate::server::state::{AppState, Dispatcher};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::{routing, Json, Router};
use std::sync::Arc;

#[derive(OpenApi)]
#[openapi(
paths(trigger_notification_run),
components(
schemas(NotificationFrequency, RunOutcome, ApiError)
),
tags((name = "notification", description = "Notification run API"))
)]
pub struct NotificationApiDoc;

pub fn api() -> Router<AppState> {
    Router::new().route("/:frequency/run", routing::post(trigger_notification_run))
}

/// Manual trigger for one notification run, equivalent to a scheduler tick
/// for the frequency. Responds once the run settles; an overlapping run
/// reports `skipped` rather than queueing.
#[utoipa::path(
post,
path = "/{frequency}/run",
context_path = "/api/v1/notifications",
tag = "notification",
params(
("frequency" = String, Path, description = "Notification frequency: hourly or daily"),
),
responses(
(status = 200, description = "run settled", body = RunOutcome),
(status = 400, description = "unknown frequency"),
)
)]
#[axum::debug_handler(state = AppState)]
#[instrument(level = "debug", skip(dispatcher))]
async fn trigger_notification_run(
    Path(frequency): Path<NotificationFrequency>, State(dispatcher): State<Arc<Dispatcher>>,
) -> impl IntoResponse {
    let outcome = dispatcher.run(frequency).await;
    info!(%frequency, ?outcome, "manually triggered notification run finished");
    Json(outcome)
}
