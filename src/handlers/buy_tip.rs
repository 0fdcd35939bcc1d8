use axum::{Json, extract::State};
use std::sync::Arc;

use crate::AppState;
use crate::error::AppError;
use crate::models::BuyTipOutcome;
use crate::services;

pub async fn get_buy_tip(State(state): State<Arc<AppState>>) -> Result<Json<BuyTipOutcome>, AppError> {
    let holdings = state.sheets()?.fetch_holdings().await?;
    Ok(Json(services::select_buy_tip(&holdings, &state.config.buy_tip)))
}
