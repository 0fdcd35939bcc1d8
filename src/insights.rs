//! AI insights per holding, generated at most once per ticker and day.
//!
//! A stored insight for `(ticker, date)` is returned as is; otherwise the
//! model is asked for a five-field JSON object which is parsed strictly and
//! upserted under the same key.

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use thiserror::Error;

use crate::error::{AppError, UpstreamError};
use crate::models::{AiInsight, GeneratedInsight, Holding, RefreshSummary};
use crate::providers::InsightGenerator;

#[derive(Debug, Error)]
pub enum InsightError {
    #[error(transparent)]
    Generation(#[from] UpstreamError),

    #[error("model response is not a JSON object")]
    NotAnObject,

    #[error("model response rejected: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("model response has an empty {0}")]
    EmptyField(&'static str),

    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

impl From<InsightError> for AppError {
    fn from(err: InsightError) -> Self {
        match err {
            InsightError::Generation(e) => AppError::Upstream(e),
            InsightError::Store(e) => AppError::Database(e),
            other => AppError::Upstream(UpstreamError::Payload {
                service: "AI",
                message: other.to_string(),
            }),
        }
    }
}

/// Persistence for generated insights, keyed by ticker and generation date.
#[async_trait]
pub trait InsightStore: Send + Sync {
    async fn find(&self, ticker: &str, date: NaiveDate) -> Result<Option<AiInsight>, sqlx::Error>;

    /// Insert, or replace the row with the same ticker and date.
    async fn upsert(&self, insight: &AiInsight) -> Result<AiInsight, sqlx::Error>;
}

pub fn build_prompt(holding: &Holding, language: &str) -> String {
    format!(
        r#"Analyze the following stock from a personal portfolio and produce an investment signal with short summaries written in {language}. Summarize the general analyst consensus; do not act as a personal advisor.

Stock profile:
- Company: {name} ({ticker})
- Average purchase price: {avg} {ccy}
- Current price: {price} {ccy}
- Unrealized profit/loss: {profit:.2} {ccy} ({diff:.2}%)
- Portfolio weight: {weight:.2}%

Requirements:
1. signal: based on the generally accepted analyst consensus, fundamentals and long-term outlook. Ignore the personal profit or loss. One of "strong_buy", "buy", "hold", "sell", "strong_sell".
2. signal_color: strong_buy = "dark_green", buy = "green", hold = "gray", sell = "orange", strong_sell = "red".
3. general_summary: 2-3 sentences on why the signal fits, covering the business model, sector and analyst trends. No analyst or institution names, no price targets.
4. personalized_summary: 1-2 sentences about this position, mentioning the profit or loss while staying with the overall consensus. If the portfolio weight is above 15%, you may mention concentration risk.
5. confidence_level: strength of the consensus, one of "low", "medium", "high".

Rules: no financial advice, neutral long-term tone, text fields only in {language}.

Return ONLY a JSON object of this exact shape:
{{
  "signal": "...",
  "signal_color": "...",
  "general_summary": "...",
  "personalized_summary": "...",
  "confidence_level": "..."
}}"#,
        name = holding.name,
        ticker = holding.ticker,
        avg = holding.average_price,
        price = holding.current_price,
        ccy = holding.currency,
        profit = holding.profit_native,
        diff = holding.percent_diff,
        weight = holding.weight_pct,
    )
}

/// Parse the model output. Anything but a JSON object carrying exactly the
/// five expected fields is rejected.
pub fn parse_generated(text: &str) -> Result<GeneratedInsight, InsightError> {
    let text = text.trim();
    if !(text.starts_with('{') && text.ends_with('}')) {
        return Err(InsightError::NotAnObject);
    }
    let insight: GeneratedInsight = serde_json::from_str(text)?;
    if insight.general_summary.trim().is_empty() {
        return Err(InsightError::EmptyField("general_summary"));
    }
    if insight.personalized_summary.trim().is_empty() {
        return Err(InsightError::EmptyField("personalized_summary"));
    }
    Ok(insight)
}

pub struct InsightService<'a> {
    pub store: &'a dyn InsightStore,
    pub generator: &'a dyn InsightGenerator,
    pub language: &'a str,
}

impl InsightService<'_> {
    /// Stored insight for `(ticker, date)`, generating one on a miss.
    pub async fn get_or_generate(&self, holding: &Holding, date: NaiveDate) -> Result<AiInsight, InsightError> {
        if let Some(cached) = self.store.find(&holding.ticker, date).await? {
            tracing::debug!(ticker = %holding.ticker, %date, "insight cache hit");
            return Ok(cached);
        }
        self.regenerate(holding, date).await
    }

    /// Generate unconditionally and replace whatever is stored for the day.
    pub async fn regenerate(&self, holding: &Holding, date: NaiveDate) -> Result<AiInsight, InsightError> {
        let prompt = build_prompt(holding, self.language);
        let text = self.generator.complete(&prompt).await?;
        let generated = parse_generated(&text)?;
        let insight = self
            .store
            .upsert(&AiInsight::from_generated(&holding.ticker, date, generated))
            .await?;
        tracing::info!(ticker = %holding.ticker, %date, signal = ?insight.signal, "insight generated");
        Ok(insight)
    }

    /// Run every holding through the insight pipeline, at most `concurrency`
    /// at a time. One ticker failing never stops the others; failures are
    /// logged and reported by ticker.
    async fn refresh_one<'h>(
        &self,
        holding: &'h Holding,
        date: NaiveDate,
        force: bool,
    ) -> (&'h str, Result<AiInsight, InsightError>) {
        let result = if force {
            self.regenerate(holding, date).await
        } else {
            self.get_or_generate(holding, date).await
        };
        (holding.ticker.as_str(), result)
    }

    pub async fn refresh_all(
        &self,
        holdings: &[Holding],
        date: NaiveDate,
        force: bool,
        concurrency: usize,
    ) -> RefreshSummary {
        // Boxed up front so the buffered stream's future stays Send for axum.
        let pending: Vec<BoxFuture<'_, _>> = holdings
            .iter()
            .map(|holding| self.refresh_one(holding, date, force).boxed())
            .collect();
        let results: Vec<_> = stream::iter(pending)
            .buffered(concurrency.max(1))
            .collect()
            .await;

        let mut insights = Vec::with_capacity(results.len());
        let mut failed = Vec::new();
        for (ticker, result) in results {
            match result {
                Ok(insight) => insights.push(insight),
                Err(e) => {
                    tracing::error!(ticker, error = %e, "insight generation failed, skipping");
                    failed.push(ticker.to_string());
                }
            }
        }

        tracing::info!(
            %date,
            generated = insights.len(),
            failed = failed.len(),
            "insight refresh finished"
        );
        RefreshSummary {
            generated_date: date,
            insights,
            failed,
        }
    }
}
