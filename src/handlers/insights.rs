use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, header},
};
use std::sync::Arc;

use super::today;
use crate::AppState;
use crate::db;
use crate::error::AppError;
use crate::insights::InsightService;
use crate::models::*;

async fn find_holding(state: &AppState, ticker: &str) -> Result<Holding, AppError> {
    state
        .sheets()?
        .fetch_holdings()
        .await?
        .into_iter()
        .find(|h| h.ticker.eq_ignore_ascii_case(ticker.trim()))
        .ok_or_else(|| AppError::NotFound(format!("Holding {ticker}")))
}

fn insight_service(state: &AppState) -> Result<InsightService<'_>, AppError> {
    Ok(InsightService {
        store: state.insight_store.as_ref(),
        generator: state.ai()?,
        language: &state.config.insight_language,
    })
}

/// With a secret configured, callers must present it as a bearer token.
pub(crate) fn authorize_cron(secret: Option<&str>, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(secret) = secret else {
        return Ok(());
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match presented {
        Some(token) if secrets_match(token.as_bytes(), secret.as_bytes()) => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}

/// Byte comparison whose running time does not depend on where the inputs differ.
fn secrets_match(presented: &[u8], expected: &[u8]) -> bool {
    let diff = presented
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b));
    presented.len() == expected.len() && diff == 0
}

pub async fn list_insights(State(state): State<Arc<AppState>>) -> Result<Json<Vec<AiInsight>>, AppError> {
    Ok(Json(db::get_latest_insights(&state.db).await?))
}

/// Today's insight for `ticker`, generated on first request of the day.
pub async fn get_insight(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
) -> Result<Json<AiInsight>, AppError> {
    let date = today();
    let holding = match state.insight_store.find(ticker.trim(), date).await? {
        Some(cached) => return Ok(Json(cached)),
        None => find_holding(&state, &ticker).await?,
    };
    let insight = insight_service(&state)?.get_or_generate(&holding, date).await?;
    Ok(Json(insight))
}

pub async fn refresh_insight(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
) -> Result<Json<AiInsight>, AppError> {
    let service = insight_service(&state)?;
    let holding = find_holding(&state, &ticker).await?;
    Ok(Json(service.regenerate(&holding, today()).await?))
}

/// Batch entry point for the scheduler.
pub async fn refresh_all(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<RefreshParams>,
) -> Result<Json<RefreshSummary>, AppError> {
    authorize_cron(state.config.cron_secret.as_deref(), &headers)?;
    let service = insight_service(&state)?;
    let holdings = state.sheets()?.fetch_holdings().await?;
    tracing::info!(count = holdings.len(), force = params.force, "refreshing insights");

    let summary = service
        .refresh_all(&holdings, today(), params.force, state.config.batch_concurrency)
        .await;
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_cron_open_without_secret() {
        assert!(authorize_cron(None, &HeaderMap::new()).is_ok());
    }

    #[test]
    fn test_cron_requires_matching_bearer() {
        let mut headers = HeaderMap::new();
        assert!(matches!(authorize_cron(Some("s3cret"), &headers), Err(AppError::Unauthorized)));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer wrong"));
        assert!(authorize_cron(Some("s3cret"), &headers).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("s3cret"));
        assert!(authorize_cron(Some("s3cret"), &headers).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        assert!(authorize_cron(Some("s3cret"), &headers).is_ok());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cret2"));
        assert!(authorize_cron(Some("s3cret"), &headers).is_err());
    }

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match(b"s3cret", b"s3cret"));
        assert!(!secrets_match(b"s3creT", b"s3cret"));
        assert!(!secrets_match(b"s3cre", b"s3cret"));
        assert!(!secrets_match(b"s3cret!", b"s3cret"));
        assert!(!secrets_match(b"", b"s3cret"));
        assert!(secrets_match(b"", b""));
    }
}
