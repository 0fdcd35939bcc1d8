//! Clients for the services the dashboard depends on but does not own.
//!
//! Each concern sits behind a small trait so handlers and services can be
//! exercised with in-memory doubles.

pub mod finnhub;
pub mod frankfurter;
pub mod gemini;
pub mod sheets;

use async_trait::async_trait;

use crate::error::UpstreamError;
use crate::models::{Holding, SymbolMatch};

/// Where holdings come from. The sheet is authoritative.
#[async_trait]
pub trait HoldingsSource: Send + Sync {
    async fn fetch_holdings(&self) -> Result<Vec<Holding>, UpstreamError>;

    /// Overwrite share count and average price for `ticker`. Returns `false`
    /// when the ticker is not in the sheet.
    async fn update_position(
        &self,
        ticker: &str,
        shares: f64,
        average_price: f64,
    ) -> Result<bool, UpstreamError>;
}

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Latest price, or `None` when the provider has no usable quote.
    async fn quote(&self, symbol: &str) -> Result<Option<f64>, UpstreamError>;

    async fn search(&self, query: &str) -> Result<Vec<SymbolMatch>, UpstreamError>;
}

#[async_trait]
pub trait FxProvider: Send + Sync {
    /// How many units of `target` one unit of `base` buys.
    async fn rate(&self, base: &str, target: &str) -> Result<f64, UpstreamError>;
}

/// Text completion used for insight generation. Implementations return the
/// raw model text; parsing is the caller's job.
#[async_trait]
pub trait InsightGenerator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, UpstreamError>;
}
