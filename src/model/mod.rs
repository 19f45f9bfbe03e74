pub mod subscription;

pub use subscription::{
    NewSubscription, Subscription, SubscriptionCursor, SubscriptionError, SubscriptionId,
    SubscriptionStore,
};

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use strum_macros::{Display, EnumString, VariantNames};

/// Identifies a city a subscriber registered interest in.
///
/// Sanitized on construction (trimmed, lowercased) so the same spelling in a
/// different case shares cache keys and per-run dedup entries.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    IntoParams,
    sqlx::Type,
    ToSchema,
    Serialize,
)]
#[into_params(names("city"))]
#[repr(transparent)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct City(String);

impl City {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

// hand-written so deserialized input (API request bodies, cached payloads)
// passes through the same sanitization as `City::new`; the derived
// transparent impl would admit the raw string
impl<'de> serde::Deserialize<'de> for City {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = <String as serde::Deserialize>::deserialize(deserializer)?;
        Ok(Self::new(raw))
    }
}

impl fmt::Display for City {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for City {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl From<City> for String {
    fn from(city: City) -> Self {
        city.0
    }
}

impl FromStr for City {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

/// Subscriber email address. Shape validation happens at the API boundary.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, sqlx::Type, ToSchema, Serialize, Deserialize,
)]
#[repr(transparent)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn parse(address: impl Into<String>) -> Result<Self, String> {
        let address = address.into();
        if validator::validate_email(&address) {
            Ok(Self(address))
        } else {
            Err(format!("not a valid email address: {address}"))
        }
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    VariantNames,
    ToSchema,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum NotificationFrequency {
    Hourly,
    Daily,
}

/// Weather conditions resolved for one city. Immutable and never partially
/// populated: a source either produces the full snapshot or fails.
#[derive(Debug, Clone, PartialEq, ToSchema, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub description: String,
}
