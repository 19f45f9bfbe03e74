pub use errors::CacheError;

use super::WeatherApi;
use crate::errors::WeatherError;
use crate::model::{City, WeatherSnapshot};
use crate::postgres::{TableColumn, TableName};
use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::{Lazy, OnceCell};
use serde_with::serde_as;
use sql_query_builder as sql;
use sqlx::PgPool;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Shared key-value cache collaborator. Many processes may read and write the
/// same store; no cross-process single-flight is attempted here.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError>;

    async fn set_json(
        &self, key: &str, value: serde_json::Value, ttl: Duration,
    ) -> Result<(), CacheError>;
}

#[derive(Debug, Clone)]
pub enum CacheServices {
    Postgres(PgCacheStore),
    InMemory(InMemoryCacheStore),
}

#[async_trait]
impl CacheStore for CacheServices {
    async fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        match self {
            Self::Postgres(store) => store.get_json(key).await,
            Self::InMemory(store) => store.get_json(key).await,
        }
    }

    async fn set_json(
        &self, key: &str, value: serde_json::Value, ttl: Duration,
    ) -> Result<(), CacheError> {
        match self {
            Self::Postgres(store) => store.set_json(key, value, ttl).await,
            Self::InMemory(store) => store.set_json(key, value, ttl).await,
        }
    }
}

pub const WEATHER_CACHE_VIEW: &str = "weather_cache";
pub static WEATHER_CACHE_TABLE: Lazy<TableName> =
    Lazy::new(|| TableName::from_str(WEATHER_CACHE_VIEW).unwrap());
static CACHE_KEY_COL: Lazy<TableColumn> = Lazy::new(|| TableColumn::new("cache_key").unwrap());
static PAYLOAD_COL: Lazy<TableColumn> = Lazy::new(|| TableColumn::new("payload").unwrap());
static EXPIRES_AT_COL: Lazy<TableColumn> = Lazy::new(|| TableColumn::new("expires_at").unwrap());

static CACHE_COLUMNS: Lazy<[TableColumn; 3]> =
    Lazy::new(|| [CACHE_KEY_COL.clone(), PAYLOAD_COL.clone(), EXPIRES_AT_COL.clone()]);
static CACHE_COLUMNS_REP: Lazy<String> = Lazy::new(|| CACHE_COLUMNS.join(", "));
static CACHE_VALUES_REP: Lazy<String> = Lazy::new(|| {
    let values =
        (1..=CACHE_COLUMNS.len()).map(|i| format!("${i}")).collect::<Vec<_>>().join(", ");

    format!("( {values} )")
});

/// Postgres-backed cache table. Expiry is enforced on read; stale rows are
/// overwritten by the next upsert for their key.
#[derive(Debug, Clone)]
pub struct PgCacheStore {
    pool: PgPool,
}

impl PgCacheStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheStore for PgCacheStore {
    #[instrument(level = "trace", skip(self), err)]
    async fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        static GET_SQL: OnceCell<String> = OnceCell::new();
        let get_sql = GET_SQL.get_or_init(|| {
            sql::Select::new()
                .select(&PAYLOAD_COL)
                .from(&WEATHER_CACHE_TABLE)
                .where_clause(format!("{} = $1", CACHE_KEY_COL.as_str()).as_str())
                .where_clause(format!("$2 < {}", EXPIRES_AT_COL.as_str()).as_str())
                .to_string()
        });

        let payload: Option<sqlx::types::Json<serde_json::Value>> = sqlx::query_scalar(get_sql)
            .bind(key)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;
        Ok(payload.map(|json| json.0))
    }

    #[instrument(level = "trace", skip(self, value), err)]
    async fn set_json(
        &self, key: &str, value: serde_json::Value, ttl: Duration,
    ) -> Result<(), CacheError> {
        static SET_SQL: OnceCell<String> = OnceCell::new();
        let set_sql = SET_SQL.get_or_init(|| {
            let conflict_clause = format!(
                "( {key} ) DO UPDATE SET {payload} = EXCLUDED.{payload}, {expires} = EXCLUDED.{expires}",
                key = CACHE_KEY_COL.as_str(),
                payload = PAYLOAD_COL.as_str(),
                expires = EXPIRES_AT_COL.as_str(),
            );

            sql::Insert::new()
                .insert_into(
                    format!(
                        "{table} ( {columns} )",
                        table = WEATHER_CACHE_TABLE.as_str(),
                        columns = CACHE_COLUMNS_REP.as_str()
                    )
                    .as_str(),
                )
                .values(&CACHE_VALUES_REP)
                .on_conflict(conflict_clause.as_str())
                .to_string()
        });

        let expires_at = Utc::now() + chrono::Duration::from_std(ttl)?;
        sqlx::query(set_sql)
            .bind(key)
            .bind(sqlx::types::Json(value))
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Process-local stand-in for the shared store, used by the happy path and
/// unit tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCacheStore {
    entries: Arc<Mutex<HashMap<String, (serde_json::Value, Instant)>>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((_, deadline)) if *deadline <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            },
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set_json(
        &self, key: &str, value: serde_json::Value, ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheTtl {
    #[serde(alias = "weather_ttl_secs")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub weather: Duration,

    #[serde(alias = "validation_ttl_secs")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub validation: Duration,
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self {
            weather: Duration::from_secs(10 * 60),
            validation: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Get-or-compute wrapper around one resolver (a single source or a fallback
/// chain).
///
/// Resolved weather is cached positively only: a `CityNotFound` is never
/// cached and is re-attempted on the next call. Validation results are cached
/// tri-state under a separate key namespace: `true` short-circuits to Ok,
/// `false` short-circuits to `InvalidCity` without consulting the resolver
/// (negative cache for known-bad input), and an absent entry falls through to
/// the resolver. Cache outages degrade to resolver calls rather than failing
/// the lookup.
#[derive(Debug, Clone)]
pub struct CacheAsideProxy<R, C> {
    resolver: R,
    cache: C,
    ttl: CacheTtl,
}

impl<R, C> CacheAsideProxy<R, C> {
    pub fn new(resolver: R, cache: C, ttl: CacheTtl) -> Self {
        Self { resolver, cache, ttl }
    }

    fn weather_key(city: &City) -> String {
        format!("weather:{city}")
    }

    fn validation_key(city: &City) -> String {
        format!("weather:validate:{city}")
    }
}

#[async_trait]
impl<R, C> WeatherApi for CacheAsideProxy<R, C>
where
    R: WeatherApi,
    C: CacheStore,
{
    #[instrument(level = "debug", skip(self), err)]
    async fn weather_for_city(&self, city: &City) -> Result<WeatherSnapshot, WeatherError> {
        let key = Self::weather_key(city);

        match self.cache.get_json(&key).await {
            Ok(Some(cached)) => match serde_json::from_value::<WeatherSnapshot>(cached) {
                Ok(snapshot) => {
                    debug!(%city, "weather cache hit");
                    return Ok(snapshot);
                },
                Err(error) => {
                    warn!(%city, "discarding undecodable weather cache entry: {error}");
                },
            },
            Ok(None) => {},
            Err(error) => {
                warn!(%city, "weather cache read failed, falling through to resolver: {error}");
            },
        }

        let snapshot = self.resolver.weather_for_city(city).await?;

        match serde_json::to_value(&snapshot) {
            Ok(value) => {
                if let Err(error) = self.cache.set_json(&key, value, self.ttl.weather).await {
                    warn!(%city, "failed to populate weather cache: {error}");
                }
            },
            Err(error) => warn!(%city, "failed to encode weather snapshot for cache: {error}"),
        }

        Ok(snapshot)
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn validate_city(&self, city: &City) -> Result<(), WeatherError> {
        let key = Self::validation_key(city);

        match self.cache.get_json(&key).await {
            Ok(Some(cached)) => match cached.as_bool() {
                Some(true) => return Ok(()),
                Some(false) => {
                    return Err(WeatherError::InvalidCity {
                        city: city.clone(),
                        reason: "city previously failed validation".to_string(),
                    });
                },
                None => {
                    warn!(%city, "discarding non-boolean validation cache entry: {cached}");
                },
            },
            Ok(None) => {},
            Err(error) => {
                warn!(%city, "validation cache read failed, falling through to resolver: {error}");
            },
        }

        match self.resolver.validate_city(city).await {
            Ok(()) => {
                if let Err(error) =
                    self.cache.set_json(&key, serde_json::Value::Bool(true), self.ttl.validation).await
                {
                    warn!(%city, "failed to record positive validation in cache: {error}");
                }
                Ok(())
            },
            Err(error) if error.is_definitive() => {
                if let Err(cache_error) =
                    self.cache.set_json(&key, serde_json::Value::Bool(false), self.ttl.validation).await
                {
                    warn!(%city, "failed to record negative validation in cache: {cache_error}");
                }
                Err(error)
            },
            Err(error) => Err(error),
        }
    }
}

mod errors {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum CacheError {
        #[error("failed cache database operation: {0}")]
        Sql(#[from] sqlx::Error),

        #[error("failed to encode cache payload: {0}")]
        Json(#[from] serde_json::Error),

        #[error("cache ttl exceeds representable expiry: {0}")]
        TtlOutOfRange(#[from] chrono::OutOfRangeError),
    }
}
