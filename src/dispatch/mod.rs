mod loader;
mod retry;
mod scheduler;

pub use loader::{LoadFailure, RunWeatherLoader};
pub use retry::retry_notify;
pub use scheduler::spawn_schedules;

pub use errors::DispatchError;

use crate::model::subscription::SubscriptionCursor;
use crate::model::{
    NotificationFrequency, Subscription, SubscriptionStore, WeatherSnapshot,
};
use crate::services::{EmailApi, WeatherApi};
use futures::future;
use std::sync::Arc;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub page_size: u32,
    pub max_attempts: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            page_size: crate::model::subscription::DEFAULT_PAGE_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Terminal account of one notification run. A run never raises to its
/// caller; delivery failures are logged and reflected here.
#[derive(Debug, Clone, PartialEq, Eq, ToSchema, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Cursor exhausted with every attempted delivery resolved.
    Completed { batches: u32, notified: u32 },

    /// A subscriber exhausted its delivery attempts (or a page fetch failed);
    /// remaining batches are left for the next scheduled tick.
    Aborted { batches: u32, notified: u32, cause: String },

    /// A previous run for the same frequency was still in progress.
    Skipped,
}

/// Drives one full notification run for a frequency: pages subscribers
/// through the cursor, resolves weather per subscriber through a run-scoped
/// deduplicating loader, and delivers one notification per subscriber with
/// bounded retry.
#[derive(Debug)]
pub struct NotificationDispatcher<S, R, E> {
    store: Arc<S>,
    resolver: Arc<R>,
    email: Arc<E>,
    config: DispatcherConfig,
    hourly_guard: tokio::sync::Mutex<()>,
    daily_guard: tokio::sync::Mutex<()>,
}

impl<S, R, E> NotificationDispatcher<S, R, E> {
    pub fn new(store: Arc<S>, resolver: Arc<R>, email: Arc<E>, config: DispatcherConfig) -> Self {
        Self {
            store,
            resolver,
            email,
            config,
            hourly_guard: tokio::sync::Mutex::new(()),
            daily_guard: tokio::sync::Mutex::new(()),
        }
    }

    const fn run_guard(&self, frequency: NotificationFrequency) -> &tokio::sync::Mutex<()> {
        match frequency {
            NotificationFrequency::Hourly => &self.hourly_guard,
            NotificationFrequency::Daily => &self.daily_guard,
        }
    }
}

impl<S, R, E> NotificationDispatcher<S, R, E>
where
    S: SubscriptionStore,
    R: WeatherApi + 'static,
    E: EmailApi,
{
    /// One scheduler tick for `frequency`. Batches are processed strictly in
    /// sequence; subscriber deliveries within a batch fan out concurrently
    /// and all settle before the batch is judged. The first subscriber whose
    /// delivery exhausts its attempts aborts the run: no further batches are
    /// fetched, and skipped subscribers wait for the next tick.
    #[instrument(level = "debug", skip(self), ret)]
    pub async fn run(&self, frequency: NotificationFrequency) -> RunOutcome {
        let Ok(_run_guard) = self.run_guard(frequency).try_lock() else {
            warn!(%frequency, "previous notification run still in progress, skipping trigger");
            return RunOutcome::Skipped;
        };

        let loader = RunWeatherLoader::new(Arc::clone(&self.resolver));
        let mut cursor =
            SubscriptionCursor::new(self.store.as_ref(), frequency, self.config.page_size);
        let mut batches = 0;
        let mut notified = 0;

        loop {
            let batch = match cursor.next_page().await {
                Ok(Some(batch)) => batch,
                Ok(None) => break,
                Err(error) => {
                    error!(%frequency, "failed to fetch subscription batch, aborting run: {error}");
                    return RunOutcome::Aborted { batches, notified, cause: error.to_string() };
                },
            };

            batches += 1;
            debug!(%frequency, batches, batch_size = batch.len(), "dispatching batch");

            let deliveries =
                batch.iter().map(|subscription| self.notify_subscriber(&loader, subscription));
            let results = future::join_all(deliveries).await;

            let mut abort_cause = None;
            for (subscription, result) in batch.iter().zip(results) {
                match result {
                    Ok(()) => notified += 1,
                    Err(error) => {
                        error!(
                            subscription_id = %subscription.id, email = %subscription.email,
                            "subscriber notification exhausted delivery attempts: {error}"
                        );
                        abort_cause.get_or_insert_with(|| error.to_string());
                    },
                }
            }

            if let Some(cause) = abort_cause {
                error!(%frequency, batches, notified, "aborting notification run: {cause}");
                return RunOutcome::Aborted { batches, notified, cause };
            }
        }

        info!(%frequency, batches, notified, "notification run completed");
        RunOutcome::Completed { batches, notified }
    }

    async fn notify_subscriber(
        &self, loader: &RunWeatherLoader<R>, subscription: &Subscription,
    ) -> Result<(), DispatchError> {
        retry_notify(self.config.max_attempts, || {
            self.attempt_delivery(loader, subscription)
        })
        .await
    }

    /// One delivery attempt: weather lookup plus send. The retry policy wraps
    /// this whole operation.
    async fn attempt_delivery(
        &self, loader: &RunWeatherLoader<R>, subscription: &Subscription,
    ) -> Result<(), DispatchError> {
        let weather = loader.load(&subscription.city).await?;
        let message = NotificationMessage::render(subscription, &weather);

        self.email
            .send(
                std::slice::from_ref(&subscription.email),
                &message.subject,
                &message.html_body,
                &message.text_body,
            )
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

impl NotificationMessage {
    pub fn render(subscription: &Subscription, weather: &WeatherSnapshot) -> Self {
        let city = &subscription.city;
        let subject = format!("{frequency} weather update for {city}", frequency = subscription.frequency);
        let text_body = format!(
            "Current weather for {city}: {description}, {temperature:.1}°C at {humidity:.0}% humidity.",
            description = weather.description,
            temperature = weather.temperature_c,
            humidity = weather.humidity_pct,
        );
        let html_body = format!(
            "<h2>Weather for {city}</h2>\
             <p>{description}</p>\
             <ul><li>Temperature: {temperature:.1}&deg;C</li>\
             <li>Humidity: {humidity:.0}%</li></ul>",
            description = weather.description,
            temperature = weather.temperature_c,
            humidity = weather.humidity_pct,
        );

        Self { subject, html_body, text_body }
    }
}

mod errors {
    use super::LoadFailure;
    use crate::model::subscription::SubscriptionError;
    use crate::services::EmailError;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum DispatchError {
        #[error("failed to resolve weather for subscriber: {0}")]
        Weather(#[from] LoadFailure),

        #[error("failed to deliver notification: {0}")]
        Email(#[from] EmailError),

        #[error("{0}")]
        Subscription(#[from] SubscriptionError),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{subscription_fixture, CountingWeatherApi, RecordingEmailApi, StubSubscriptionStore};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const CITIES: [&str; 5] = ["kyiv", "lviv", "odesa", "dnipro", "kharkiv"];

    fn dispatcher_over(
        store: StubSubscriptionStore, email: RecordingEmailApi,
    ) -> NotificationDispatcher<StubSubscriptionStore, CountingWeatherApi, RecordingEmailApi> {
        NotificationDispatcher::new(
            Arc::new(store),
            Arc::new(CountingWeatherApi::new()),
            Arc::new(email),
            DispatcherConfig { page_size: 50, max_attempts: 3 },
        )
    }

    fn fifty_five_subscribers() -> StubSubscriptionStore {
        let subscriptions = (0..55)
            .map(|i| {
                subscription_fixture(
                    &format!("user{i}@example.com"),
                    CITIES[i % CITIES.len()],
                    NotificationFrequency::Hourly,
                )
            })
            .collect();
        StubSubscriptionStore::with_subscriptions(subscriptions)
    }

    #[tokio::test]
    async fn test_full_run_dedups_cities_and_notifies_all() {
        once_cell::sync::Lazy::force(&crate::setup_tracing::TEST_TRACING);
        let dispatcher = dispatcher_over(fifty_five_subscribers(), RecordingEmailApi::new());

        let outcome = dispatcher.run(NotificationFrequency::Hourly).await;
        assert_eq!(outcome, RunOutcome::Completed { batches: 2, notified: 55 });

        // 55 subscribers over 5 distinct cities resolve weather exactly 5 times
        assert_eq!(dispatcher.resolver.total_resolutions(), 5);
        for city in CITIES {
            assert_eq!(dispatcher.resolver.resolutions_for(&crate::model::City::new(city)), 1);
        }
        assert_eq!(dispatcher.email.sent_count(), 55);
    }

    #[tokio::test]
    async fn test_transient_send_failure_recovers_within_attempts() {
        once_cell::sync::Lazy::force(&crate::setup_tracing::TEST_TRACING);
        let store = StubSubscriptionStore::with_subscriptions(vec![subscription_fixture(
            "flaky@example.com",
            "kyiv",
            NotificationFrequency::Daily,
        )]);
        let email = RecordingEmailApi::new();
        email.fail_times("flaky@example.com", 2);
        let dispatcher = dispatcher_over(store, email);

        let outcome = dispatcher.run(NotificationFrequency::Daily).await;
        assert_eq!(outcome, RunOutcome::Completed { batches: 1, notified: 1 });
        assert_eq!(dispatcher.email.sent_count(), 1);
        assert_eq!(dispatcher.email.attempts(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_abort_run_before_next_batch() {
        once_cell::sync::Lazy::force(&crate::setup_tracing::TEST_TRACING);
        let store = fifty_five_subscribers();
        let email = RecordingEmailApi::new();
        email.always_fail("user7@example.com");
        let dispatcher = dispatcher_over(store, email);

        let outcome = dispatcher.run(NotificationFrequency::Hourly).await;
        match outcome {
            RunOutcome::Aborted { batches, notified, .. } => {
                assert_eq!(batches, 1);
                assert_eq!(notified, 49);
            },
            other => panic!("expected aborted run, got: {other:?}"),
        }

        // the second page is never requested after the abort
        assert_eq!(dispatcher.store.page_fetches(), 1);
        assert_eq!(dispatcher.email.sent_count(), 49);
    }

    #[tokio::test]
    async fn test_overlapping_trigger_is_skipped() {
        once_cell::sync::Lazy::force(&crate::setup_tracing::TEST_TRACING);
        let store = StubSubscriptionStore::with_subscriptions(vec![subscription_fixture(
            "slow@example.com",
            "kyiv",
            NotificationFrequency::Hourly,
        )]);
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::new(store),
            Arc::new(CountingWeatherApi::with_delay(Duration::from_millis(100))),
            Arc::new(RecordingEmailApi::new()),
            DispatcherConfig { page_size: 50, max_attempts: 3 },
        ));

        let background = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.run(NotificationFrequency::Hourly).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let overlapping = dispatcher.run(NotificationFrequency::Hourly).await;
        assert_eq!(overlapping, RunOutcome::Skipped);

        let original = background.await.unwrap();
        assert_eq!(original, RunOutcome::Completed { batches: 1, notified: 1 });
    }

    #[tokio::test]
    async fn test_run_for_other_frequency_proceeds_during_overlap() {
        once_cell::sync::Lazy::force(&crate::setup_tracing::TEST_TRACING);
        let store = StubSubscriptionStore::with_subscriptions(vec![
            subscription_fixture("hourly@example.com", "kyiv", NotificationFrequency::Hourly),
            subscription_fixture("daily@example.com", "lviv", NotificationFrequency::Daily),
        ]);
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::new(store),
            Arc::new(CountingWeatherApi::with_delay(Duration::from_millis(100))),
            Arc::new(RecordingEmailApi::new()),
            DispatcherConfig { page_size: 50, max_attempts: 3 },
        ));

        let background = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.run(NotificationFrequency::Hourly).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let daily = dispatcher.run(NotificationFrequency::Daily).await;
        assert_eq!(daily, RunOutcome::Completed { batches: 1, notified: 1 });
        background.await.unwrap();
    }

    #[test]
    fn test_notification_message_render() {
        let subscription =
            subscription_fixture("user@example.com", "Kyiv", NotificationFrequency::Hourly);
        let weather = WeatherSnapshot {
            temperature_c: 21.55,
            humidity_pct: 63.0,
            description: "light rain".to_string(),
        };

        let message = NotificationMessage::render(&subscription, &weather);
        assert_eq!(message.subject, "hourly weather update for kyiv");
        assert!(message.text_body.contains("light rain"));
        assert!(message.text_body.contains("21.6°C"));
        assert!(message.html_body.contains("63%"));
    }
}
