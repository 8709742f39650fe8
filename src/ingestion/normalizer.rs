use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::models::NormalizedMarket;
use crate::polymarket::types::{RawMarket, RawNumber};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload has no usable id")]
    MissingId,
}

/// Convert one raw Gamma market object into a `NormalizedMarket`.
///
/// Only structural problems (not an object, no id) are errors. Unparseable
/// prices become `None`; unparseable or negative volumes become zero.
pub fn normalize_market(payload: &Value) -> Result<NormalizedMarket, NormalizeError> {
    // Derived structs also accept sequences, so check the shape first.
    if !payload.is_object() {
        return Err(NormalizeError::NotAnObject);
    }
    let raw = RawMarket::deserialize(payload).map_err(|_| NormalizeError::NotAnObject)?;

    let market_id = raw
        .id
        .as_ref()
        .and_then(|id| id.key())
        .ok_or(NormalizeError::MissingId)?;

    let prices = raw
        .outcome_prices
        .clone()
        .map(|p| p.into_list())
        .unwrap_or_default();
    let yes_price = prices.first().and_then(parse_probability);
    let no_price = prices.get(1).and_then(parse_probability);

    let outcome = if raw.resolved == Some(true) {
        non_empty(raw.outcome.as_deref())
    } else {
        None
    };

    Ok(NormalizedMarket {
        market_id,
        question: non_empty(raw.question.as_deref()).unwrap_or_else(|| "Unknown".into()),
        description: non_empty(raw.description.as_deref()),
        yes_price,
        no_price,
        volume: non_negative(raw.volume.as_ref().and_then(RawNumber::to_decimal)),
        volume_24h: non_negative(raw.volume_24h_value()),
        liquidity: non_negative(raw.liquidity.as_ref().and_then(RawNumber::to_decimal)),
        active: raw.active,
        resolved: raw.resolved,
        outcome,
        end_date: raw.end_date.as_deref().and_then(parse_end_date),
    })
}

fn parse_probability(value: &RawNumber) -> Option<Decimal> {
    value
        .to_decimal()
        .filter(|p| *p >= Decimal::ZERO && *p <= Decimal::ONE)
}

fn non_negative(value: Option<Decimal>) -> Decimal {
    value
        .filter(|v| *v >= Decimal::ZERO)
        .unwrap_or(Decimal::ZERO)
}

fn parse_end_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
