use axum::{Json, extract::State};
use std::sync::Arc;

use super::today;
use crate::AppState;
use crate::db;
use crate::error::AppError;
use crate::models::*;
use crate::services;

pub async fn get_overview(State(state): State<Arc<AppState>>) -> Result<Json<Overview>, AppError> {
    let transactions = db::get_all_transactions(&state.db).await?;
    let snapshots = db::get_all_snapshots(&state.db).await?;

    Ok(Json(Overview {
        reporting_currency: state.config.reporting_currency.clone(),
        summary: services::overview_summary(&transactions, &snapshots),
        evolution: services::monthly_evolution(&transactions, &snapshots),
    }))
}

pub async fn get_performance(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PerformanceMetrics>, AppError> {
    let transactions = db::get_all_transactions(&state.db).await?;
    let snapshots = db::get_all_snapshots(&state.db).await?;
    Ok(Json(services::performance_metrics(&transactions, &snapshots)))
}

pub async fn get_goal(State(state): State<Arc<AppState>>) -> Result<Json<GoalProgress>, AppError> {
    let target = db::get_preferences(&state.db)
        .await?
        .portfolio_goal
        .ok_or_else(|| AppError::NotFound("Portfolio goal".into()))?;
    let transactions = db::get_all_transactions(&state.db).await?;
    let snapshots = db::get_all_snapshots(&state.db).await?;
    let current = services::overview_summary(&transactions, &snapshots).total_value;

    Ok(Json(services::goal_progress(current, target, &snapshots, today())))
}
