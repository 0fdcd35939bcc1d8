use chrono::{Datelike, Months, NaiveDate};
use futures::future::join_all;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::models::*;
use crate::providers::{FxProvider, QuoteProvider};

const DAYS_PER_MONTH: Decimal = Decimal::from_parts(3044, 0, 0, false, 2); // 30.44

// ─── Cash flow & snapshots ───

/// Deposits minus withdrawals.
pub fn total_invested(transactions: &[CashTransaction]) -> Decimal {
    transactions.iter().map(CashTransaction::signed_amount).sum()
}

/// Snapshots by date ascending; equal dates keep input order so the last
/// one written wins wherever a later entry overrides an earlier one.
fn sorted_snapshots(snapshots: &[ValuationSnapshot]) -> Vec<&ValuationSnapshot> {
    let mut sorted: Vec<_> = snapshots.iter().collect();
    sorted.sort_by_key(|s| s.date);
    sorted
}

fn month_label(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

fn pct_of(part: Decimal, base: Decimal) -> Decimal {
    if base.is_zero() {
        Decimal::ZERO
    } else {
        (part / base * Decimal::ONE_HUNDRED).round_dp(2)
    }
}

/// Month-by-month cumulative invested amount next to the portfolio value
/// recorded for that month.
pub fn monthly_evolution(
    transactions: &[CashTransaction],
    snapshots: &[ValuationSnapshot],
) -> Vec<EvolutionPoint> {
    let mut months: BTreeMap<String, (Decimal, Option<Decimal>)> = BTreeMap::new();

    for tx in transactions {
        months.entry(month_label(tx.date)).or_default().0 += tx.signed_amount();
    }
    for snapshot in sorted_snapshots(snapshots) {
        months.entry(month_label(snapshot.date)).or_default().1 = Some(snapshot.value);
    }

    let mut cumulative = Decimal::ZERO;
    months
        .into_iter()
        .map(|(month, (invested, value))| {
            cumulative += invested;
            EvolutionPoint {
                month,
                total_invested: cumulative,
                portfolio_value: value,
            }
        })
        .collect()
}

#[derive(Default)]
struct Bucket {
    performance: Decimal,
    base: Option<Decimal>,
}

impl Bucket {
    fn add(&mut self, performance: Decimal, previous_value: Decimal) {
        self.performance += performance;
        self.base.get_or_insert(previous_value);
    }

    fn into_point(self, label: String) -> PerformancePoint {
        PerformancePoint {
            label,
            performance: self.performance,
            change_pct: pct_of(self.performance, self.base.unwrap_or_default()),
        }
    }
}

/// Market performance between consecutive snapshots with deposits and
/// withdrawals in `(earlier, later]` taken out, bucketed by ISO week and by
/// calendar month of the later snapshot.
pub fn performance_metrics(
    transactions: &[CashTransaction],
    snapshots: &[ValuationSnapshot],
) -> PerformanceMetrics {
    let sorted = sorted_snapshots(snapshots);
    let mut weekly: BTreeMap<(i32, u32), Bucket> = BTreeMap::new();
    let mut monthly: BTreeMap<(i32, u32), Bucket> = BTreeMap::new();

    for pair in sorted.windows(2) {
        let (previous, current) = (pair[0], pair[1]);
        let net_flow: Decimal = transactions
            .iter()
            .filter(|tx| tx.date > previous.date && tx.date <= current.date)
            .map(CashTransaction::signed_amount)
            .sum();
        let performance = (current.value - previous.value) - net_flow;

        let week = current.date.iso_week();
        weekly
            .entry((week.year(), week.week()))
            .or_default()
            .add(performance, previous.value);
        monthly
            .entry((current.date.year(), current.date.month()))
            .or_default()
            .add(performance, previous.value);
    }

    let weekly: Vec<_> = weekly
        .into_iter()
        .map(|((year, week), bucket)| bucket.into_point(format!("W{week:02} {year}")))
        .collect();
    let monthly: Vec<_> = monthly
        .into_iter()
        .map(|((year, month), bucket)| bucket.into_point(format!("{year:04}-{month:02}")))
        .collect();
    let summary = performance_summary(&weekly, &monthly);

    PerformanceMetrics {
        weekly,
        monthly,
        summary,
    }
}

fn performance_summary(
    weekly: &[PerformancePoint],
    monthly: &[PerformancePoint],
) -> Option<PerformanceSummary> {
    let all = || weekly.iter().chain(monthly.iter());
    let best = all().max_by_key(|p| p.performance)?;
    let worst = all().min_by_key(|p| p.performance)?;
    let current = weekly.last().or(monthly.last())?;
    Some(PerformanceSummary {
        best: best.clone(),
        worst: worst.clone(),
        current: current.clone(),
    })
}

pub fn overview_summary(
    transactions: &[CashTransaction],
    snapshots: &[ValuationSnapshot],
) -> OverviewSummary {
    let total_invested = total_invested(transactions);
    let total_value = sorted_snapshots(snapshots)
        .last()
        .map(|s| s.value)
        .unwrap_or(total_invested);
    let total_profit = total_value - total_invested;
    OverviewSummary {
        total_invested,
        total_value,
        total_profit,
        profit_pct: pct_of(total_profit, total_invested),
    }
}

// ─── Goal ───

/// Average change in portfolio value per month between the first and the
/// last snapshot.
pub fn average_monthly_increase(snapshots: &[ValuationSnapshot]) -> Decimal {
    let sorted = sorted_snapshots(snapshots);
    let (Some(first), Some(last)) = (sorted.first(), sorted.last()) else {
        return Decimal::ZERO;
    };
    let days = (last.date - first.date).num_days();
    if sorted.len() < 2 || days <= 0 {
        return Decimal::ZERO;
    }
    let months = Decimal::from(days) / DAYS_PER_MONTH;
    ((last.value - first.value) / months).round_dp(2)
}

fn project_goal_date(
    current: Decimal,
    target: Decimal,
    monthly_increase: Decimal,
    today: NaiveDate,
) -> Option<NaiveDate> {
    if current >= target || monthly_increase <= Decimal::ZERO {
        return None;
    }
    let months = ((target - current) / monthly_increase).ceil().to_u32()?;
    today.checked_add_months(Months::new(months))
}

pub fn goal_progress(
    current_value: Decimal,
    target: Decimal,
    snapshots: &[ValuationSnapshot],
    today: NaiveDate,
) -> GoalProgress {
    let monthly = average_monthly_increase(snapshots);
    let optimistic = monthly * Decimal::new(13, 1);
    let conservative = monthly * Decimal::new(7, 1);

    GoalProgress {
        target,
        current_value,
        progress_pct: pct_of(current_value, target).min(Decimal::ONE_HUNDRED),
        average_monthly_increase: monthly,
        projection: GoalProjection {
            realistic: project_goal_date(current_value, target, monthly, today),
            optimistic: project_goal_date(current_value, target, optimistic, today),
            conservative: project_goal_date(current_value, target, conservative, today),
        },
    }
}

// ─── Buy tip ───

/// Percent distance of `current` from `average`; zero when there is no
/// cost basis.
pub fn percent_diff(current: f64, average: f64) -> f64 {
    if average == 0.0 {
        return 0.0;
    }
    let diff = (current - average) / average * 100.0;
    if diff.is_finite() { diff } else { 0.0 }
}

/// Pick the eligible holding furthest below its average price. Ties keep
/// the first one found.
pub fn select_buy_tip(holdings: &[Holding], criteria: &BuyTipCriteria) -> BuyTipOutcome {
    if holdings.is_empty() {
        return BuyTipOutcome::NoTip {
            reason: NoTipReason::NoHoldings,
        };
    }

    let mut best: Option<BuyTip> = None;
    for holding in holdings {
        let diff = percent_diff(holding.current_price, holding.average_price);
        let eligible = diff < criteria.max_percent_diff && holding.weight_pct < criteria.max_weight_pct;
        if !eligible {
            continue;
        }
        if best.as_ref().is_none_or(|b| diff < b.calculated_percent_diff) {
            best = Some(BuyTip {
                holding: holding.clone(),
                calculated_percent_diff: diff,
            });
        }
    }

    match best {
        Some(tip) => BuyTipOutcome::Tip(tip),
        None => BuyTipOutcome::NoTip {
            reason: NoTipReason::NoEligibleHolding,
        },
    }
}

// ─── Holdings enrichment ───

/// Live prices by ticker and conversion rates by currency, as far as the
/// providers could deliver them.
#[derive(Debug, Default)]
pub struct MarketData {
    pub prices: HashMap<String, f64>,
    pub rates: HashMap<String, f64>,
}

/// Fetch a quote per ticker and one rate per currency. Failures are logged
/// and left out; the caller falls back to sheet prices and a rate of 1.
pub async fn load_market_data(
    holdings: &[Holding],
    quotes: Option<&dyn QuoteProvider>,
    fx: &dyn FxProvider,
    reporting_currency: &str,
) -> MarketData {
    let quote_results = match quotes {
        Some(quotes) => {
            join_all(holdings.iter().map(|h| async move {
                (h.ticker.as_str(), quotes.quote(&h.ticker).await)
            }))
            .await
        }
        None => Vec::new(),
    };

    let mut prices = HashMap::new();
    for (ticker, result) in quote_results {
        match result {
            Ok(Some(price)) => {
                prices.insert(ticker.to_string(), price);
            }
            Ok(None) => tracing::warn!(ticker, "no live quote, using sheet price"),
            Err(e) => tracing::warn!(ticker, error = %e, "quote lookup failed, using sheet price"),
        }
    }

    let currencies: HashSet<&str> = holdings
        .iter()
        .map(|h| h.currency.as_str())
        .filter(|c| !c.eq_ignore_ascii_case(reporting_currency))
        .collect();
    let rate_results = join_all(currencies.into_iter().map(|currency| async move {
        (currency, fx.rate(currency, reporting_currency).await)
    }))
    .await;

    let mut rates = HashMap::new();
    rates.insert(reporting_currency.to_string(), 1.0);
    for (currency, result) in rate_results {
        match result {
            Ok(rate) => {
                rates.insert(currency.to_string(), rate);
            }
            Err(e) => tracing::warn!(
                currency,
                target = reporting_currency,
                error = %e,
                "FX lookup failed, assuming 1:1"
            ),
        }
    }

    MarketData { prices, rates }
}

/// Value every holding in the reporting currency and weigh it against the
/// total.
pub fn enrich_holdings(holdings: &[Holding], market: &MarketData) -> Vec<EnrichedHolding> {
    let mut enriched: Vec<EnrichedHolding> = holdings
        .iter()
        .map(|h| {
            let live_price = market.prices.get(&h.ticker).copied();
            let price = live_price.or((h.current_price > 0.0).then_some(h.current_price));
            let fx_rate = market.rates.get(&h.currency).copied().unwrap_or(1.0);

            let invested = h.shares * h.average_price * fx_rate;
            let value = price.map(|p| h.shares * p * fx_rate).unwrap_or(invested);
            let profit = value - invested;
            let profit_pct = if invested == 0.0 { 0.0 } else { profit / invested * 100.0 };

            EnrichedHolding {
                holding: h.clone(),
                live_price,
                fx_rate,
                invested_reporting: invested,
                current_value_reporting: value,
                current_profit_reporting: profit,
                profit_pct,
                price_diff_pct: percent_diff(price.unwrap_or(h.average_price), h.average_price),
                portfolio_weight_pct: 0.0, // filled after total computed
            }
        })
        .collect();

    let total: f64 = enriched.iter().map(|e| e.current_value_reporting).sum();
    if total > 0.0 {
        for e in &mut enriched {
            e.portfolio_weight_pct = e.current_value_reporting / total * 100.0;
        }
    }
    enriched
}

/// Stable sort putting tickers from the user's manual order first, in that
/// order; everything else keeps its original position after them.
pub fn sort_by_preference<T>(items: &mut [T], order: &[String], ticker: impl Fn(&T) -> &str) {
    let rank: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, t)| (t.as_str(), i))
        .collect();
    items.sort_by_key(|item| rank.get(ticker(item)).copied().unwrap_or(usize::MAX));
}
