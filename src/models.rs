use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ─── Holdings ───

/// One row of the portfolio sheet. The sheet is authoritative; nothing here
/// is persisted locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub ticker: String,
    pub name: String,
    pub shares: f64,
    pub average_price: f64,
    pub current_price: f64,
    pub percent_diff: f64,
    pub value_native: f64,
    pub profit_native: f64,
    pub weight_pct: f64,
    pub recommendation: String,
    pub currency: String,
    pub value_reporting: f64,
    pub profit_reporting: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichedHolding {
    #[serde(flatten)]
    pub holding: Holding,
    pub live_price: Option<f64>,
    pub fx_rate: f64,
    pub invested_reporting: f64,
    pub current_value_reporting: f64,
    pub current_profit_reporting: f64,
    pub profit_pct: f64,
    pub price_diff_pct: f64,
    pub portfolio_weight_pct: f64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateHoldingInput {
    pub shares: Option<serde_json::Value>,
    pub average_price: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionUpdate {
    pub ticker: String,
    pub shares: f64,
    pub average_price: f64,
}

// ─── Transactions ───

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdraw,
}

impl TransactionKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deposit" => Some(Self::Deposit),
            "withdraw" | "withdrawal" => Some(Self::Withdraw),
            _ => None,
        }
    }
}

/// A deposit or withdrawal. `amount` is always a positive magnitude; the sign
/// comes from `kind`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CashTransaction {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub created_at: Option<DateTime<Utc>>,
}

impl CashTransaction {
    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            TransactionKind::Deposit => self.amount,
            TransactionKind::Withdraw => -self.amount,
        }
    }
}

/// Raw request body; validated into [`NewTransaction`] so bad fields come
/// back as a 400 naming the field.
#[derive(Debug, Deserialize)]
pub struct TransactionInput {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub date: Option<String>,
    pub amount: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub kind: TransactionKind,
    pub date: NaiveDate,
    pub amount: Decimal,
}

// ─── Valuation snapshots ───

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ValuationSnapshot {
    pub id: Uuid,
    pub date: NaiveDate,
    pub value: Decimal,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct SnapshotInput {
    pub date: Option<String>,
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSnapshot {
    pub date: NaiveDate,
    pub value: Decimal,
}

// ─── AI insights ───

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "insight_signal", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    #[serde(alias = "SILNÝ NÁKUP", alias = "STRONG BUY")]
    StrongBuy,
    #[serde(alias = "NÁKUP", alias = "BUY")]
    Buy,
    #[serde(alias = "DRŽAŤ", alias = "HOLD")]
    Hold,
    #[serde(alias = "PREDAJ", alias = "SELL")]
    Sell,
    #[serde(alias = "SILNÝ PREDAJ", alias = "STRONG SELL")]
    StrongSell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "signal_color", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SignalColor {
    DarkGreen,
    Green,
    Gray,
    Orange,
    Red,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "confidence_level", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// The five fields the model must return, nothing more.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratedInsight {
    pub signal: Signal,
    pub signal_color: SignalColor,
    pub general_summary: String,
    pub personalized_summary: String,
    #[serde(rename = "confidence_level", alias = "confidence")]
    pub confidence: Confidence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AiInsight {
    pub ticker: String,
    pub signal: Signal,
    pub signal_color: SignalColor,
    pub general_summary: String,
    pub personalized_summary: String,
    pub confidence: Confidence,
    pub generated_date: NaiveDate,
    pub created_at: Option<DateTime<Utc>>,
}

impl AiInsight {
    pub fn from_generated(ticker: &str, date: NaiveDate, generated: GeneratedInsight) -> Self {
        Self {
            ticker: ticker.to_string(),
            signal: generated.signal,
            signal_color: generated.signal_color,
            general_summary: generated.general_summary,
            personalized_summary: generated.personalized_summary,
            confidence: generated.confidence,
            generated_date: date,
            created_at: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RefreshSummary {
    pub generated_date: NaiveDate,
    pub insights: Vec<AiInsight>,
    pub failed: Vec<String>,
}

// ─── Preferences ───

/// Per-user settings that used to live in browser storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
pub struct UserPreferences {
    pub portfolio_goal: Option<Decimal>,
    #[serde(default)]
    pub holdings_order: Vec<String>,
}

// ─── Charts ───

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvolutionPoint {
    pub month: String, // "2025-02"
    pub total_invested: Decimal,
    pub portfolio_value: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformancePoint {
    pub label: String,
    pub performance: Decimal,
    pub change_pct: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub best: PerformancePoint,
    pub worst: PerformancePoint,
    pub current: PerformancePoint,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub weekly: Vec<PerformancePoint>,
    pub monthly: Vec<PerformancePoint>,
    pub summary: Option<PerformanceSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewSummary {
    pub total_invested: Decimal,
    pub total_value: Decimal,
    pub total_profit: Decimal,
    pub profit_pct: Decimal,
}

#[derive(Debug, Serialize)]
pub struct Overview {
    pub reporting_currency: String,
    #[serde(flatten)]
    pub summary: OverviewSummary,
    pub evolution: Vec<EvolutionPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalProjection {
    pub realistic: Option<NaiveDate>,
    pub optimistic: Option<NaiveDate>,
    pub conservative: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalProgress {
    pub target: Decimal,
    pub current_value: Decimal,
    pub progress_pct: Decimal,
    pub average_monthly_increase: Decimal,
    pub projection: GoalProjection,
}

// ─── Buy tip ───

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuyTipCriteria {
    pub max_weight_pct: f64,
    pub max_percent_diff: f64,
}

impl Default for BuyTipCriteria {
    fn default() -> Self {
        Self {
            max_weight_pct: 10.0,
            max_percent_diff: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuyTip {
    #[serde(flatten)]
    pub holding: Holding,
    pub calculated_percent_diff: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoTipReason {
    NoHoldings,
    NoEligibleHolding,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuyTipOutcome {
    Tip(BuyTip),
    NoTip { reason: NoTipReason },
}

// ─── Market ───

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolMatch {
    pub symbol: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FxRate {
    pub base: String,
    pub target: String,
    pub rate: f64,
}

// ─── Query params ───

#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FxParams {
    pub base: Option<String>,
    pub target: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshParams {
    #[serde(default)]
    pub force: bool,
}
