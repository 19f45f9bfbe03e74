mod cursor;
mod repository;

pub use cursor::{SubscriptionCursor, DEFAULT_PAGE_SIZE};
pub use repository::{PostgresSubscriptionStore, SUBSCRIPTIONS_TABLE};

use crate::model::{City, EmailAddress, NotificationFrequency};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

pub use errors::SubscriptionError;

#[derive(
    Debug, Clone, PartialEq, Eq, Hash, sqlx::Type, ToSchema, Serialize, Deserialize,
)]
#[repr(transparent)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(cuid2::create_id())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for SubscriptionId {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, ToSchema, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub email: EmailAddress,
    pub city: City,
    pub frequency: NotificationFrequency,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSubscription {
    pub email: EmailAddress,
    pub city: City,
    pub frequency: NotificationFrequency,
}

impl NewSubscription {
    pub fn assign_id(self) -> Subscription {
        Subscription {
            id: SubscriptionId::generate(),
            email: self.email,
            city: self.city,
            frequency: self.frequency,
            created_at: Utc::now(),
        }
    }
}

/// Persistence seam for subscriptions. The production implementation is
/// [`PostgresSubscriptionStore`]; tests drive the cursor and dispatcher
/// through in-memory stand-ins.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Create a subscription after checking the at-most-one-per-email
    /// invariant. Fails with `AlreadyExists` on a duplicate email.
    async fn create(
        &self, subscription: NewSubscription,
    ) -> Result<Subscription, SubscriptionError>;

    async fn exists_by_email(&self, email: &EmailAddress) -> Result<bool, SubscriptionError>;

    /// Returns `true` when a subscription was removed, `false` when the id
    /// was unknown.
    async fn remove_by_id(&self, id: &SubscriptionId) -> Result<bool, SubscriptionError>;

    /// One page of subscriptions for a frequency, in the store's stable
    /// default order.
    async fn fetch_page(
        &self, frequency: NotificationFrequency, limit: u32, offset: u32,
    ) -> Result<Vec<Subscription>, SubscriptionError>;
}

mod errors {
    use super::SubscriptionId;
    use crate::model::EmailAddress;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum SubscriptionError {
        #[error("an active subscription already exists for email: {0}")]
        AlreadyExists(EmailAddress),

        #[error("no subscription found for id: {0}")]
        NotFound(SubscriptionId),

        #[error("failed subscription database operation: {0}")]
        Sql(#[from] sqlx::Error),
    }
}
