pub mod buy_tip;
pub mod holdings;
pub mod insights;
pub mod market;
pub mod overview;
pub mod preferences;
pub mod snapshots;
pub mod transactions;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

use crate::error::AppError;

pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// `YYYY-MM-DD`, nothing else.
pub(crate) fn parse_date(field: &str, raw: Option<&str>) -> Result<NaiveDate, AppError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation(field, format!("{field} is required")))?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::validation(field, format!("{field} must be a date in YYYY-MM-DD format")))
}

/// A JSON number or a plain decimal string. User input is never run through
/// the locale parser: `"1 000,50"` is rejected, not guessed at.
pub(crate) fn parse_decimal(field: &str, raw: Option<&Value>) -> Result<Decimal, AppError> {
    let invalid = || AppError::validation(field, format!("{field} must be a number"));
    match raw {
        None | Some(Value::Null) => Err(AppError::validation(field, format!("{field} is required"))),
        Some(Value::Number(n)) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .map_err(|_| invalid())
        }
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Err(AppError::validation(field, format!("{field} is required")));
            }
            Decimal::from_str(s).map_err(|_| invalid())
        }
        Some(_) => Err(invalid()),
    }
}

pub(crate) fn parse_positive(field: &str, raw: Option<&Value>) -> Result<Decimal, AppError> {
    let value = parse_decimal(field, raw)?;
    if value <= Decimal::ZERO {
        return Err(AppError::validation(field, format!("{field} must be greater than zero")));
    }
    Ok(value)
}

pub(crate) fn parse_non_negative(field: &str, raw: Option<&Value>) -> Result<Decimal, AppError> {
    let value = parse_decimal(field, raw)?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(AppError::validation(field, format!("{field} must not be negative")));
    }
    Ok(value)
}
