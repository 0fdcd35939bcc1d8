use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;

use crate::AppState;
use crate::db;
use crate::error::AppError;
use crate::models::UserPreferences;

/// Goal must be positive; the order is trimmed and de-duplicated, first
/// occurrence wins.
pub(crate) fn normalize_preferences(input: UserPreferences) -> Result<UserPreferences, AppError> {
    if let Some(goal) = input.portfolio_goal {
        if goal <= Decimal::ZERO {
            return Err(AppError::validation("portfolio_goal", "portfolio_goal must be greater than zero"));
        }
    }

    let mut seen = HashSet::new();
    let holdings_order = input
        .holdings_order
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect();

    Ok(UserPreferences {
        portfolio_goal: input.portfolio_goal,
        holdings_order,
    })
}

pub async fn get_preferences(
    State(state): State<Arc<AppState>>,
) -> Result<Json<UserPreferences>, AppError> {
    Ok(Json(db::get_preferences(&state.db).await?))
}

pub async fn update_preferences(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UserPreferences>, JsonRejection>,
) -> Result<Json<UserPreferences>, AppError> {
    let Json(input) = payload?;
    let prefs = normalize_preferences(input)?;
    Ok(Json(db::save_preferences(&state.db, &prefs).await?))
}
