//! Stub collaborators shared by the unit tests: scripted weather sources,
//! an in-memory subscription store, and a recording email transport.

use crate::errors::WeatherError;
use crate::model::subscription::{NewSubscription, Subscription, SubscriptionError, SubscriptionId};
use crate::model::{City, EmailAddress, NotificationFrequency, SubscriptionStore, WeatherSnapshot};
use crate::services::{EmailApi, EmailError, WeatherApi};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn subscription_fixture(
    email: &str, city: &str, frequency: NotificationFrequency,
) -> Subscription {
    Subscription {
        id: SubscriptionId::generate(),
        email: EmailAddress::new(email),
        city: City::new(city),
        frequency,
        created_at: Utc::now(),
    }
}

#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Weather(WeatherSnapshot),
    NotFound,
    Invalid,
    Upstream,
}

/// Weather source that always answers with one scripted outcome and counts
/// how often it was consulted.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    outcome: ScriptedOutcome,
    calls: Arc<AtomicU32>,
    delay: Option<Duration>,
}

impl ScriptedSource {
    pub fn new(outcome: ScriptedOutcome) -> Self {
        Self { outcome, calls: Arc::new(AtomicU32::new(0)), delay: None }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count_handle(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }

    async fn consult(&self, city: &City) -> Result<WeatherSnapshot, WeatherError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.outcome {
            ScriptedOutcome::Weather(snapshot) => Ok(snapshot.clone()),
            ScriptedOutcome::NotFound => Err(WeatherError::CityNotFound(city.clone())),
            ScriptedOutcome::Invalid => Err(WeatherError::InvalidCity {
                city: city.clone(),
                reason: "scripted invalid city".to_string(),
            }),
            ScriptedOutcome::Upstream => Err(WeatherError::upstream(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "scripted upstream outage",
            ))),
        }
    }
}

#[async_trait]
impl WeatherApi for ScriptedSource {
    async fn weather_for_city(&self, city: &City) -> Result<WeatherSnapshot, WeatherError> {
        self.consult(city).await
    }

    async fn validate_city(&self, city: &City) -> Result<(), WeatherError> {
        self.consult(city).await.map(|_| ())
    }
}

/// Resolver stand-in that records distinct resolutions per city, to observe
/// the per-run dedup of the loader and dispatcher.
#[derive(Debug, Default)]
pub struct CountingWeatherApi {
    calls: Mutex<HashMap<City, u32>>,
    delay: Option<Duration>,
}

impl CountingWeatherApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { calls: Mutex::new(HashMap::new()), delay: Some(delay) }
    }

    pub fn resolutions_for(&self, city: &City) -> u32 {
        self.calls.lock().unwrap().get(city).copied().unwrap_or(0)
    }

    pub fn total_resolutions(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl WeatherApi for CountingWeatherApi {
    async fn weather_for_city(&self, city: &City) -> Result<WeatherSnapshot, WeatherError> {
        {
            let mut calls = self.calls.lock().unwrap();
            *calls.entry(city.clone()).or_insert(0) += 1;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        Ok(WeatherSnapshot {
            temperature_c: 15.0,
            humidity_pct: 50.0,
            description: format!("conditions over {city}"),
        })
    }

    async fn validate_city(&self, _city: &City) -> Result<(), WeatherError> {
        Ok(())
    }
}

/// In-memory subscription store with a page-fetch counter.
#[derive(Debug, Default)]
pub struct StubSubscriptionStore {
    subscriptions: Mutex<Vec<Subscription>>,
    page_fetches: AtomicU32,
}

impl StubSubscriptionStore {
    pub fn with_subscriptions(subscriptions: Vec<Subscription>) -> Self {
        Self { subscriptions: Mutex::new(subscriptions), page_fetches: AtomicU32::new(0) }
    }

    pub fn page_fetches(&self) -> u32 {
        self.page_fetches.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }
}

#[async_trait]
impl SubscriptionStore for StubSubscriptionStore {
    async fn create(
        &self, subscription: NewSubscription,
    ) -> Result<Subscription, SubscriptionError> {
        if self.exists_by_email(&subscription.email).await? {
            return Err(SubscriptionError::AlreadyExists(subscription.email));
        }

        let subscription = subscription.assign_id();
        self.subscriptions.lock().unwrap().push(subscription.clone());
        Ok(subscription)
    }

    async fn exists_by_email(&self, email: &EmailAddress) -> Result<bool, SubscriptionError> {
        let subscriptions = self.subscriptions.lock().unwrap();
        Ok(subscriptions.iter().any(|s| &s.email == email))
    }

    async fn remove_by_id(&self, id: &SubscriptionId) -> Result<bool, SubscriptionError> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let before = subscriptions.len();
        subscriptions.retain(|s| &s.id != id);
        Ok(subscriptions.len() < before)
    }

    async fn fetch_page(
        &self, frequency: NotificationFrequency, limit: u32, offset: u32,
    ) -> Result<Vec<Subscription>, SubscriptionError> {
        self.page_fetches.fetch_add(1, Ordering::SeqCst);
        let subscriptions = self.subscriptions.lock().unwrap();
        Ok(subscriptions
            .iter()
            .filter(|s| s.frequency == frequency)
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentEmail {
    pub recipients: Vec<EmailAddress>,
    pub subject: String,
}

/// Email transport that records deliveries and can be scripted to fail a
/// number of attempts (or every attempt) for a given recipient.
#[derive(Debug, Default)]
pub struct RecordingEmailApi {
    sent: Mutex<Vec<SentEmail>>,
    failures: Mutex<HashMap<String, u32>>,
    attempts: AtomicU32,
}

impl RecordingEmailApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` sends addressed to `recipient`.
    pub fn fail_times(&self, recipient: &str, times: u32) {
        self.failures.lock().unwrap().insert(recipient.to_string(), times);
    }

    /// Fail every send addressed to `recipient`.
    pub fn always_fail(&self, recipient: &str) {
        self.failures.lock().unwrap().insert(recipient.to_string(), u32::MAX);
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmailApi for RecordingEmailApi {
    async fn send(
        &self, recipients: &[EmailAddress], subject: &str, _html_body: &str, _text_body: &str,
    ) -> Result<(), EmailError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        {
            let mut failures = self.failures.lock().unwrap();
            for recipient in recipients {
                if let Some(remaining) = failures.get_mut(recipient.as_str()) {
                    if *remaining == u32::MAX {
                        return Err(EmailError::Rejected(format!(
                            "scripted permanent failure for {recipient}"
                        )));
                    }
                    if 0 < *remaining {
                        *remaining -= 1;
                        return Err(EmailError::Rejected(format!(
                            "scripted transient failure for {recipient}"
                        )));
                    }
                }
            }
        }

        self.sent.lock().unwrap().push(SentEmail {
            recipients: recipients.to_vec(),
            subject: subject.to_string(),
        });
        Ok(())
    }
}
