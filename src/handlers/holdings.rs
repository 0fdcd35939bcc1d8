use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;

use super::parse_non_negative;
use crate::AppState;
use crate::db;
use crate::error::AppError;
use crate::models::*;
use crate::services;

/// Holdings from the sheet, valued in the reporting currency and ordered by
/// the user's saved order.
pub async fn list_holdings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<EnrichedHolding>>, AppError> {
    let holdings = state.sheets()?.fetch_holdings().await?;
    let reporting = state.config.reporting_currency.as_str();

    if state.quotes.is_none() {
        tracing::warn!("FINNHUB_API_KEY not set, valuing holdings at sheet prices");
    }
    let market =
        services::load_market_data(&holdings, state.quotes.as_deref(), state.fx.as_ref(), reporting).await;
    let mut enriched = services::enrich_holdings(&holdings, &market);

    // A missing order only affects presentation.
    let prefs = db::get_preferences(&state.db).await.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "could not load preferences, keeping sheet order");
        UserPreferences::default()
    });
    services::sort_by_preference(&mut enriched, &prefs.holdings_order, |h| h.holding.ticker.as_str());

    Ok(Json(enriched))
}

pub async fn update_holding(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
    payload: Result<Json<UpdateHoldingInput>, JsonRejection>,
) -> Result<Json<PositionUpdate>, AppError> {
    let Json(input) = payload?;
    let as_f64 = |field: &str, value: rust_decimal::Decimal| {
        value
            .to_f64()
            .ok_or_else(|| AppError::validation(field, format!("{field} is out of range")))
    };
    let shares = as_f64("shares", parse_non_negative("shares", input.shares.as_ref())?)?;
    let average_price = as_f64(
        "average_price",
        parse_non_negative("average_price", input.average_price.as_ref())?,
    )?;

    let ticker = ticker.trim().to_string();
    if !state.sheets()?.update_position(&ticker, shares, average_price).await? {
        return Err(AppError::NotFound(format!("Holding {ticker}")));
    }
    Ok(Json(PositionUpdate {
        ticker,
        shares,
        average_price,
    }))
}
