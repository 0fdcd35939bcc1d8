use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
};
use std::sync::Arc;
use uuid::Uuid;

use super::{parse_date, parse_positive};
use crate::AppState;
use crate::db;
use crate::error::AppError;
use crate::models::*;

pub(crate) fn validate_transaction(input: TransactionInput) -> Result<NewTransaction, AppError> {
    let kind = match input.kind.as_deref() {
        None => return Err(AppError::validation("type", "type is required")),
        Some(raw) => TransactionKind::parse(raw)
            .ok_or_else(|| AppError::validation("type", "type must be 'deposit' or 'withdraw'"))?,
    };
    Ok(NewTransaction {
        kind,
        date: parse_date("date", input.date.as_deref())?,
        amount: parse_positive("amount", input.amount.as_ref())?,
    })
}

pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Vec<CashTransaction>>, AppError> {
    let transactions = match params.limit {
        Some(limit) => db::get_recent_transactions(&state.db, limit.clamp(1, 1000)).await?,
        None => db::get_all_transactions(&state.db).await?,
    };
    Ok(Json(transactions))
}

pub async fn create_transaction(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TransactionInput>, JsonRejection>,
) -> Result<(StatusCode, Json<CashTransaction>), AppError> {
    let Json(input) = payload?;
    let tx = validate_transaction(input)?;
    let created = db::insert_transaction(&state.db, &tx).await?;
    tracing::info!(id = %created.id, kind = ?created.kind, amount = %created.amount, "transaction recorded");
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Result<Json<TransactionInput>, JsonRejection>,
) -> Result<Json<CashTransaction>, AppError> {
    let Json(input) = payload?;
    let tx = validate_transaction(input)?;
    db::update_transaction(&state.db, id, &tx)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Transaction".into()))
}

pub async fn delete_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if db::delete_transaction(&state.db, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("Transaction".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn input(kind: Option<&str>, date: Option<&str>, amount: Option<serde_json::Value>) -> TransactionInput {
        TransactionInput {
            kind: kind.map(String::from),
            date: date.map(String::from),
            amount,
        }
    }

    #[test]
    fn test_valid_transaction() {
        let tx = validate_transaction(input(Some("withdraw"), Some("2024-01-20"), Some(json!("200")))).unwrap();
        assert_eq!(
            tx,
            NewTransaction {
                kind: TransactionKind::Withdraw,
                date: NaiveDate::from_ymd_opt(2024, 1, 20).unwrap(),
                amount: Decimal::from(200),
            }
        );
    }

    #[test]
    fn test_each_bad_field_is_named() {
        let field = |i| match validate_transaction(i) {
            Err(AppError::Validation { field, .. }) => field,
            other => panic!("expected validation error, got {other:?}"),
        };
        assert_eq!(field(input(None, Some("2024-01-01"), Some(json!(1)))), "type");
        assert_eq!(field(input(Some("transfer"), Some("2024-01-01"), Some(json!(1)))), "type");
        assert_eq!(field(input(Some("deposit"), Some("01/01/2024"), Some(json!(1)))), "date");
        assert_eq!(field(input(Some("deposit"), Some("2024-01-01"), Some(json!(-1)))), "amount");
        assert_eq!(field(input(Some("deposit"), Some("2024-01-01"), Some(json!("1,5")))), "amount");
    }
}
