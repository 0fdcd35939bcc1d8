use axum::{
    Json,
    extract::{Path, Query, State},
};
use std::sync::Arc;

use crate::AppState;
use crate::error::AppError;
use crate::models::*;

fn currency_code(field: &str, raw: Option<&str>) -> Result<String, AppError> {
    let code = raw
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::validation(field, format!("{field} is required")))?;
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::validation(field, format!("{field} must be a 3-letter currency code")));
    }
    Ok(code)
}

pub async fn get_quote(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
) -> Result<Json<Quote>, AppError> {
    let symbol = ticker.trim().to_uppercase();
    let price = state
        .quotes()?
        .quote(&symbol)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Quote for {symbol}")))?;
    Ok(Json(Quote { symbol, price }))
}

pub async fn search_ticker(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<SymbolMatch>>, AppError> {
    let query = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| AppError::validation("q", "q is required"))?;
    Ok(Json(state.quotes()?.search(query).await?))
}

/// Rate from `base` into `target`, defaulting the target to the reporting
/// currency.
pub async fn get_fx_rate(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FxParams>,
) -> Result<Json<FxRate>, AppError> {
    let base = currency_code("base", params.base.as_deref())?;
    let target = currency_code(
        "target",
        Some(params.target.as_deref().unwrap_or(&state.config.reporting_currency)),
    )?;
    let rate = state.fx.rate(&base, &target).await?;
    Ok(Json(FxRate { base, target, rate }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_code() {
        assert_eq!(currency_code("base", Some(" usd ")).unwrap(), "USD");
        assert!(currency_code("base", None).is_err());
        assert!(currency_code("base", Some("US")).is_err());
        assert!(currency_code("base", Some("U$D")).is_err());
    }
}
