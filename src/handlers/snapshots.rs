use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use std::sync::Arc;
use uuid::Uuid;

use super::{parse_date, parse_non_negative};
use crate::AppState;
use crate::db;
use crate::error::AppError;
use crate::models::*;

pub(crate) fn validate_snapshot(input: SnapshotInput) -> Result<NewSnapshot, AppError> {
    Ok(NewSnapshot {
        date: parse_date("date", input.date.as_deref())?,
        value: parse_non_negative("value", input.value.as_ref())?,
    })
}

pub async fn list_snapshots(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ValuationSnapshot>>, AppError> {
    Ok(Json(db::get_all_snapshots(&state.db).await?))
}

pub async fn create_snapshot(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SnapshotInput>, JsonRejection>,
) -> Result<(StatusCode, Json<ValuationSnapshot>), AppError> {
    let Json(input) = payload?;
    let snapshot = validate_snapshot(input)?;
    let created = db::insert_snapshot(&state.db, &snapshot).await?;
    tracing::info!(id = %created.id, date = %created.date, value = %created.value, "snapshot recorded");
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_snapshot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Result<Json<SnapshotInput>, JsonRejection>,
) -> Result<Json<ValuationSnapshot>, AppError> {
    let Json(input) = payload?;
    let snapshot = validate_snapshot(input)?;
    db::update_snapshot(&state.db, id, &snapshot)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Snapshot".into()))
}

pub async fn delete_snapshot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if db::delete_snapshot(&state.db, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("Snapshot".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;

    #[test]
    fn test_zero_value_allowed() {
        let snapshot = validate_snapshot(SnapshotInput {
            date: Some("2024-06-30".into()),
            value: Some(json!(0)),
        })
        .unwrap();
        assert_eq!(snapshot.value, Decimal::ZERO);
    }

    #[test]
    fn test_negative_or_missing_value_rejected() {
        let negative = validate_snapshot(SnapshotInput {
            date: Some("2024-06-30".into()),
            value: Some(json!("-10")),
        });
        assert!(matches!(negative, Err(AppError::Validation { ref field, .. }) if field == "value"));

        let missing_date = validate_snapshot(SnapshotInput {
            date: None,
            value: Some(json!(10)),
        });
        assert!(matches!(missing_date, Err(AppError::Validation { ref field, .. }) if field == "date"));
    }
}
