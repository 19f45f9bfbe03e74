use super::{Subscription, SubscriptionError, SubscriptionStore};
use crate::model::NotificationFrequency;

pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Paginated, ordered iteration over persisted subscriptions for one
/// frequency. Finite and not restartable mid-iteration.
///
/// The cursor advances its offset by `limit` between fetches, not by rows the
/// caller consumed, so concurrent mutation of the underlying set (e.g. an
/// unsubscribe landing between page fetches) can skip or repeat rows. Known
/// caveat of offset pagination; a keyset cursor on `(created_at, id)` is the
/// upgrade path.
#[derive(Debug)]
pub struct SubscriptionCursor<'s, S> {
    store: &'s S,
    frequency: NotificationFrequency,
    limit: u32,
    offset: u32,
    done: bool,
}

impl<'s, S> SubscriptionCursor<'s, S> {
    pub fn new(store: &'s S, frequency: NotificationFrequency, limit: u32) -> Self {
        Self { store, frequency, limit: limit.max(1), offset: 0, done: false }
    }
}

impl<S: SubscriptionStore> SubscriptionCursor<'_, S> {
    /// Next non-empty page, or `None` once the cursor is exhausted. A fetched
    /// page shorter than `limit` is yielded and treated as the last page.
    #[instrument(level = "trace", skip(self), fields(frequency = %self.frequency, offset = self.offset))]
    pub async fn next_page(&mut self) -> Result<Option<Vec<Subscription>>, SubscriptionError> {
        if self.done {
            return Ok(None);
        }

        let page = self.store.fetch_page(self.frequency, self.limit, self.offset).await?;
        if page.is_empty() {
            self.done = true;
            return Ok(None);
        }

        if (page.len() as u32) < self.limit {
            self.done = true;
        }
        self.offset += self.limit;
        Ok(Some(page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{subscription_fixture, StubSubscriptionStore};
    use claims::{assert_none, assert_ok, assert_some};
    use pretty_assertions::assert_eq;

    fn store_with(count: usize, frequency: NotificationFrequency) -> StubSubscriptionStore {
        let subscriptions = (0..count)
            .map(|i| subscription_fixture(&format!("user{i}@example.com"), "kyiv", frequency))
            .collect();
        StubSubscriptionStore::with_subscriptions(subscriptions)
    }

    #[tokio::test]
    async fn test_55_rows_yield_pages_of_50_and_5() {
        once_cell::sync::Lazy::force(&crate::setup_tracing::TEST_TRACING);
        let store = store_with(55, NotificationFrequency::Hourly);
        let mut cursor =
            SubscriptionCursor::new(&store, NotificationFrequency::Hourly, DEFAULT_PAGE_SIZE);

        let first = assert_some!(assert_ok!(cursor.next_page().await));
        assert_eq!(first.len(), 50);
        let second = assert_some!(assert_ok!(cursor.next_page().await));
        assert_eq!(second.len(), 5);
        assert_none!(assert_ok!(cursor.next_page().await));

        // short page terminated the cursor without another fetch
        assert_eq!(store.page_fetches(), 2);
    }

    #[tokio::test]
    async fn test_exact_page_multiple_requires_trailing_fetch() {
        once_cell::sync::Lazy::force(&crate::setup_tracing::TEST_TRACING);
        let store = store_with(50, NotificationFrequency::Daily);
        let mut cursor =
            SubscriptionCursor::new(&store, NotificationFrequency::Daily, DEFAULT_PAGE_SIZE);

        let first = assert_some!(assert_ok!(cursor.next_page().await));
        assert_eq!(first.len(), 50);
        assert_none!(assert_ok!(cursor.next_page().await));
        assert_eq!(store.page_fetches(), 2);
    }

    #[tokio::test]
    async fn test_no_matching_rows() {
        once_cell::sync::Lazy::force(&crate::setup_tracing::TEST_TRACING);
        let store = store_with(7, NotificationFrequency::Hourly);
        let mut cursor =
            SubscriptionCursor::new(&store, NotificationFrequency::Daily, DEFAULT_PAGE_SIZE);

        assert_none!(assert_ok!(cursor.next_page().await));
        assert_none!(assert_ok!(cursor.next_page().await));
        assert_eq!(store.page_fetches(), 1);
    }

    #[tokio::test]
    async fn test_frequency_filter_applies() {
        once_cell::sync::Lazy::force(&crate::setup_tracing::TEST_TRACING);
        let mut subscriptions = vec![
            subscription_fixture("hourly@example.com", "kyiv", NotificationFrequency::Hourly),
            subscription_fixture("daily@example.com", "lviv", NotificationFrequency::Daily),
        ];
        subscriptions
            .push(subscription_fixture("also@example.com", "odesa", NotificationFrequency::Hourly));
        let store = StubSubscriptionStore::with_subscriptions(subscriptions);

        let mut cursor = SubscriptionCursor::new(&store, NotificationFrequency::Hourly, 10);
        let page = assert_some!(assert_ok!(cursor.next_page().await));
        assert_eq!(page.len(), 2);
        assert!(page.iter().all(|s| s.frequency == NotificationFrequency::Hourly));
    }
}
