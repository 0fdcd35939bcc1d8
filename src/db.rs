use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::insights::InsightStore;
use crate::models::*;

// ─── Cash transactions ───

pub async fn get_all_transactions(pool: &PgPool) -> Result<Vec<CashTransaction>, sqlx::Error> {
    sqlx::query_as::<_, CashTransaction>(
        "SELECT * FROM cash_transactions ORDER BY date DESC, created_at DESC",
    )
    .fetch_all(pool)
    .await
}

pub async fn get_recent_transactions(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<CashTransaction>, sqlx::Error> {
    sqlx::query_as::<_, CashTransaction>(
        "SELECT * FROM cash_transactions ORDER BY date DESC, created_at DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn insert_transaction(
    pool: &PgPool,
    tx: &NewTransaction,
) -> Result<CashTransaction, sqlx::Error> {
    sqlx::query_as::<_, CashTransaction>(
        "INSERT INTO cash_transactions (id, kind, date, amount) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(tx.kind)
    .bind(tx.date)
    .bind(tx.amount)
    .fetch_one(pool)
    .await
}

pub async fn update_transaction(
    pool: &PgPool,
    id: Uuid,
    tx: &NewTransaction,
) -> Result<Option<CashTransaction>, sqlx::Error> {
    sqlx::query_as::<_, CashTransaction>(
        "UPDATE cash_transactions SET kind = $2, date = $3, amount = $4 WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(tx.kind)
    .bind(tx.date)
    .bind(tx.amount)
    .fetch_optional(pool)
    .await
}

pub async fn delete_transaction(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM cash_transactions WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ─── Valuation snapshots ───

/// Oldest first; rows sharing a date keep insertion order.
pub async fn get_all_snapshots(pool: &PgPool) -> Result<Vec<ValuationSnapshot>, sqlx::Error> {
    sqlx::query_as::<_, ValuationSnapshot>(
        "SELECT * FROM valuation_snapshots ORDER BY date, created_at",
    )
    .fetch_all(pool)
    .await
}

pub async fn insert_snapshot(
    pool: &PgPool,
    snapshot: &NewSnapshot,
) -> Result<ValuationSnapshot, sqlx::Error> {
    sqlx::query_as::<_, ValuationSnapshot>(
        "INSERT INTO valuation_snapshots (id, date, value) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(snapshot.date)
    .bind(snapshot.value)
    .fetch_one(pool)
    .await
}

pub async fn update_snapshot(
    pool: &PgPool,
    id: Uuid,
    snapshot: &NewSnapshot,
) -> Result<Option<ValuationSnapshot>, sqlx::Error> {
    sqlx::query_as::<_, ValuationSnapshot>(
        "UPDATE valuation_snapshots SET date = $2, value = $3 WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(snapshot.date)
    .bind(snapshot.value)
    .fetch_optional(pool)
    .await
}

pub async fn delete_snapshot(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM valuation_snapshots WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ─── AI insights ───

pub async fn get_insight(
    pool: &PgPool,
    ticker: &str,
    date: NaiveDate,
) -> Result<Option<AiInsight>, sqlx::Error> {
    sqlx::query_as::<_, AiInsight>(
        "SELECT * FROM ai_insights WHERE ticker = $1 AND generated_date = $2",
    )
    .bind(ticker)
    .bind(date)
    .fetch_optional(pool)
    .await
}

pub async fn upsert_insight(pool: &PgPool, insight: &AiInsight) -> Result<AiInsight, sqlx::Error> {
    sqlx::query_as::<_, AiInsight>(
        r#"INSERT INTO ai_insights
               (ticker, signal, signal_color, general_summary, personalized_summary, confidence, generated_date)
           VALUES ($1, $2, $3, $4, $5, $6, $7)
           ON CONFLICT (ticker, generated_date) DO UPDATE SET
               signal = EXCLUDED.signal,
               signal_color = EXCLUDED.signal_color,
               general_summary = EXCLUDED.general_summary,
               personalized_summary = EXCLUDED.personalized_summary,
               confidence = EXCLUDED.confidence,
               created_at = NOW()
           RETURNING *"#,
    )
    .bind(&insight.ticker)
    .bind(insight.signal)
    .bind(insight.signal_color)
    .bind(&insight.general_summary)
    .bind(&insight.personalized_summary)
    .bind(insight.confidence)
    .bind(insight.generated_date)
    .fetch_one(pool)
    .await
}

/// Most recent insight per ticker.
pub async fn get_latest_insights(pool: &PgPool) -> Result<Vec<AiInsight>, sqlx::Error> {
    sqlx::query_as::<_, AiInsight>(
        "SELECT DISTINCT ON (ticker) * FROM ai_insights ORDER BY ticker, generated_date DESC",
    )
    .fetch_all(pool)
    .await
}

#[async_trait]
impl InsightStore for PgPool {
    async fn find(&self, ticker: &str, date: NaiveDate) -> Result<Option<AiInsight>, sqlx::Error> {
        get_insight(self, ticker, date).await
    }

    async fn upsert(&self, insight: &AiInsight) -> Result<AiInsight, sqlx::Error> {
        upsert_insight(self, insight).await
    }
}

// ─── Preferences ───

pub async fn get_preferences(pool: &PgPool) -> Result<UserPreferences, sqlx::Error> {
    let row = sqlx::query_as::<_, UserPreferences>(
        "SELECT portfolio_goal, holdings_order FROM user_preferences WHERE id = 1",
    )
    .fetch_optional(pool)
    .await?;
    Ok(row.unwrap_or_default())
}

pub async fn save_preferences(
    pool: &PgPool,
    prefs: &UserPreferences,
) -> Result<UserPreferences, sqlx::Error> {
    sqlx::query_as::<_, UserPreferences>(
        r#"INSERT INTO user_preferences (id, portfolio_goal, holdings_order, updated_at)
           VALUES (1, $1, $2, NOW())
           ON CONFLICT (id) DO UPDATE SET
               portfolio_goal = EXCLUDED.portfolio_goal,
               holdings_order = EXCLUDED.holdings_order,
               updated_at = NOW()
           RETURNING portfolio_goal, holdings_order"#,
    )
    .bind(prefs.portfolio_goal)
    .bind(&prefs.holdings_order)
    .fetch_one(pool)
    .await
}
