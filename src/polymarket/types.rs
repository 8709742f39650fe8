use std::str::FromStr;

use rust_decimal::Decimal;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// A Gamma `/markets` entry as it arrives on the wire.
///
/// Every field is optional and tolerant: a value of the wrong JSON type reads
/// as absent instead of rejecting the whole payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMarket {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<RawId>,
    #[serde(default, deserialize_with = "lenient")]
    pub question: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub description: Option<String>,
    /// Either a JSON array or a string holding one, e.g. `"[\"0.65\", \"0.35\"]"`.
    #[serde(default, rename = "outcomePrices", deserialize_with = "lenient")]
    pub outcome_prices: Option<RawPrices>,
    #[serde(default, deserialize_with = "lenient")]
    pub volume: Option<RawNumber>,
    #[serde(default, rename = "volume24h", deserialize_with = "lenient")]
    pub volume_24h: Option<RawNumber>,
    #[serde(default, rename = "volume24hr", deserialize_with = "lenient")]
    pub volume_24hr: Option<RawNumber>,
    #[serde(default, deserialize_with = "lenient")]
    pub liquidity: Option<RawNumber>,
    #[serde(default, deserialize_with = "lenient")]
    pub active: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    pub resolved: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    pub outcome: Option<String>,
    #[serde(default, rename = "endDate", deserialize_with = "lenient")]
    pub end_date: Option<String>,
}

/// Market ids show up as strings or bare numbers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Text(String),
    Number(serde_json::Number),
}

impl RawId {
    /// Canonical string key; blank strings have none.
    pub fn key(&self) -> Option<String> {
        match self {
            RawId::Text(s) => Some(s.trim()).filter(|s| !s.is_empty()).map(str::to_string),
            RawId::Number(n) => Some(n.to_string()),
        }
    }
}

/// A number, a numeric string, or anything else (which parses to nothing).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Number(serde_json::Number),
    Text(String),
    Other(IgnoredAny),
}

impl RawNumber {
    /// Accepts exponent notation as well as plain decimals.
    pub fn to_decimal(&self) -> Option<Decimal> {
        let text = match self {
            RawNumber::Number(n) => n.to_string(),
            RawNumber::Text(s) => s.trim().to_string(),
            RawNumber::Other(_) => return None,
        };

        Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .ok()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawPrices {
    List(Vec<RawNumber>),
    Encoded(String),
}

impl RawPrices {
    /// Flatten to a list; an undecodable string yields no prices.
    pub fn into_list(self) -> Vec<RawNumber> {
        match self {
            RawPrices::List(items) => items,
            RawPrices::Encoded(s) => serde_json::from_str(&s).unwrap_or_default(),
        }
    }
}

impl RawMarket {
    /// First of `volume24h` / `volume24hr` that holds a usable number.
    pub fn volume_24h_value(&self) -> Option<Decimal> {
        [&self.volume_24h, &self.volume_24hr]
            .into_iter()
            .flatten()
            .find_map(RawNumber::to_decimal)
    }
}

/// Deserialize `T`, treating a mismatched shape as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}
