use super::{NewSubscription, Subscription, SubscriptionError, SubscriptionId, SubscriptionStore};
use crate::model::{EmailAddress, NotificationFrequency};
use crate::postgres::{TableColumn, TableName, CREATED_AT_COL};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::{Lazy, OnceCell};
use sql_query_builder as sql;
use sqlx::PgPool;
use std::str::FromStr;

pub const SUBSCRIPTIONS_VIEW: &str = "subscriptions";
pub static SUBSCRIPTIONS_TABLE: Lazy<TableName> =
    Lazy::new(|| TableName::from_str(SUBSCRIPTIONS_VIEW).unwrap());
static PRIMARY_KEY: Lazy<TableColumn> = Lazy::new(|| TableColumn::new("id").unwrap());
static EMAIL_COL: Lazy<TableColumn> = Lazy::new(|| TableColumn::new("email").unwrap());
static CITY_COL: Lazy<TableColumn> = Lazy::new(|| TableColumn::new("city").unwrap());
static FREQUENCY_COL: Lazy<TableColumn> = Lazy::new(|| TableColumn::new("frequency").unwrap());

static COLUMNS: Lazy<[TableColumn; 5]> = Lazy::new(|| {
    [
        PRIMARY_KEY.clone(),
        EMAIL_COL.clone(),
        CITY_COL.clone(),
        FREQUENCY_COL.clone(),
        CREATED_AT_COL.clone(),
    ]
});
static COLUMNS_REP: Lazy<String> = Lazy::new(|| COLUMNS.join(", "));
static VALUES_REP: Lazy<String> = Lazy::new(|| {
    let values = (1..=COLUMNS.len()).map(|i| format!("${i}")).collect::<Vec<_>>().join(", ");

    format!("( {values} )")
});

#[derive(Debug, Clone)]
pub struct PostgresSubscriptionStore {
    pool: PgPool,
}

impl PostgresSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for PostgresSubscriptionStore {
    /// Existence-check before insert. The check-then-insert pair is not
    /// transactional; a unique index on `email` backs the invariant against a
    /// concurrent duplicate subscribe.
    #[instrument(level = "debug", skip(self), err)]
    async fn create(
        &self, subscription: NewSubscription,
    ) -> Result<Subscription, SubscriptionError> {
        if self.exists_by_email(&subscription.email).await? {
            return Err(SubscriptionError::AlreadyExists(subscription.email));
        }

        static INSERT_SQL: OnceCell<String> = OnceCell::new();
        let insert_sql = INSERT_SQL.get_or_init(|| {
            sql::Insert::new()
                .insert_into(format!("{} ( {} )", *SUBSCRIPTIONS_TABLE, *COLUMNS_REP).as_str())
                .values(&VALUES_REP)
                .to_string()
        });

        let subscription = subscription.assign_id();
        sqlx::query(insert_sql)
            .bind(&subscription.id)
            .bind(&subscription.email)
            .bind(&subscription.city)
            .bind(subscription.frequency.to_string())
            .bind(subscription.created_at)
            .execute(&self.pool)
            .await?;

        Ok(subscription)
    }

    #[instrument(level = "trace", skip(self), ret, err)]
    async fn exists_by_email(&self, email: &EmailAddress) -> Result<bool, SubscriptionError> {
        static EXISTS_SQL: OnceCell<String> = OnceCell::new();
        let exists_sql = EXISTS_SQL.get_or_init(|| {
            sql::Select::new()
                .select(&PRIMARY_KEY)
                .from(&SUBSCRIPTIONS_TABLE)
                .where_clause(format!("{} = $1", EMAIL_COL.as_str()).as_str())
                .limit("1")
                .to_string()
        });

        let found = sqlx::query(exists_sql).bind(email).fetch_optional(&self.pool).await?;
        Ok(found.is_some())
    }

    #[instrument(level = "debug", skip(self), ret, err)]
    async fn remove_by_id(&self, id: &SubscriptionId) -> Result<bool, SubscriptionError> {
        static DELETE_SQL: OnceCell<String> = OnceCell::new();
        let delete_sql = DELETE_SQL.get_or_init(|| {
            sql::Delete::new()
                .delete_from(&SUBSCRIPTIONS_TABLE)
                .where_clause(format!("{} = $1", PRIMARY_KEY.as_str()).as_str())
                .to_string()
        });

        let result = sqlx::query(delete_sql).bind(id).execute(&self.pool).await?;
        Ok(0 < result.rows_affected())
    }

    #[instrument(level = "trace", skip(self), err)]
    async fn fetch_page(
        &self, frequency: NotificationFrequency, limit: u32, offset: u32,
    ) -> Result<Vec<Subscription>, SubscriptionError> {
        static PAGE_SQL: OnceCell<String> = OnceCell::new();
        let page_sql = PAGE_SQL.get_or_init(|| {
            sql::Select::new()
                .select(&COLUMNS_REP)
                .from(&SUBSCRIPTIONS_TABLE)
                .where_clause(format!("{} = $1", FREQUENCY_COL.as_str()).as_str())
                .order_by(format!("{}, {}", CREATED_AT_COL.as_str(), PRIMARY_KEY.as_str()).as_str())
                .limit("$2")
                .offset("$3")
                .to_string()
        });

        let page = sqlx::query_as(page_sql)
            .bind(frequency.to_string())
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&self.pool)
            .await?;
        Ok(page)
    }
}

impl<'r, R> sqlx::FromRow<'r, R> for Subscription
where
    R: sqlx::Row,
    String: sqlx::Decode<'r, <R as sqlx::Row>::Database> + sqlx::Type<<R as sqlx::Row>::Database>,
    DateTime<Utc>:
        sqlx::Decode<'r, <R as sqlx::Row>::Database> + sqlx::Type<<R as sqlx::Row>::Database>,
{
    fn from_row(row: &'r R) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get(PRIMARY_KEY.clone())?;
        let email: String = row.try_get(EMAIL_COL.clone())?;
        let city: String = row.try_get(CITY_COL.clone())?;

        let frequency_rep: String = row.try_get(FREQUENCY_COL.clone())?;
        let frequency = NotificationFrequency::from_str(&frequency_rep).map_err(|err| {
            sqlx::Error::ColumnDecode {
                index: FREQUENCY_COL.to_string(),
                source: Box::new(err),
            }
        })?;

        let created_at: DateTime<Utc> = row.try_get(CREATED_AT_COL.clone())?;

        Ok(Self {
            id: SubscriptionId::new(id),
            email: EmailAddress::new(email),
            city: crate::model::City::new(city),
            frequency,
            created_at,
        })
    }
}
