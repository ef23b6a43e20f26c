use chrono::{Local, NaiveDateTime, SubsecRound};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single fetched price sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    /// Lowest fare shown for the route
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,

    /// ISO currency code (e.g., "EUR")
    pub currency: String,

    /// Local time the sample was taken
    pub timestamp: NaiveDateTime,
}

/// Delta between two adjacent observations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Local time the change was detected
    pub timestamp: NaiveDateTime,

    #[serde(with = "rust_decimal::serde::float")]
    pub old_price: Decimal,

    #[serde(with = "rust_decimal::serde::float")]
    pub new_price: Decimal,

    /// `new_price - old_price`
    #[serde(with = "rust_decimal::serde::float")]
    pub change: Decimal,

    /// Relative change, rounded to 2 dp; zero when `old_price` is zero
    #[serde(with = "rust_decimal::serde::float")]
    pub change_percent: Decimal,

    pub currency: String,
}

/// Everything the tracker persists between runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryDocument {
    #[serde(default)]
    pub prices: Vec<PriceObservation>,

    #[serde(default)]
    pub notifications: Vec<ChangeEvent>,
}

/// What gets pushed to the hub
#[derive(Debug, Clone, Copy)]
pub enum PriceUpdate<'a> {
    Observation(&'a PriceObservation),
    Change(&'a ChangeEvent),
}

impl PriceUpdate<'_> {
    /// Price shown as the sensor state
    pub fn price(&self) -> Decimal {
        match self {
            PriceUpdate::Observation(obs) => obs.price,
            PriceUpdate::Change(evt) => evt.new_price,
        }
    }

    pub fn currency(&self) -> &str {
        match self {
            PriceUpdate::Observation(obs) => &obs.currency,
            PriceUpdate::Change(evt) => &evt.currency,
        }
    }
}

/// Current local time at microsecond precision
pub fn now_local() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(6)
}
