//! Performance metrics and statistics.
//!
//! Every figure is measured from the starting capital, before the first
//! trade, so the cost of entering the first position shows up in returns,
//! ratios and drawdown alike.

use crate::domain::backtest::{BacktestResult, EquityPoint, turnover};
use crate::domain::weighting::{Allocation, total_weight};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Weight changes smaller than this do not count as a rebalance.
const REBALANCE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration: i64,
    pub win_rate: f64,
    pub best_day: f64,
    pub worst_day: f64,
    pub avg_turnover: f64,
    pub avg_holdings: f64,
    pub time_in_market: f64,
    pub rebalance_count: usize,
    pub trading_days: usize,
}

impl Metrics {
    /// Score an equity curve that started from `initial_capital`, and the
    /// allocations that produced it.
    pub fn compute(
        initial_capital: f64,
        equity_curve: &[EquityPoint],
        daily_weights: &[Allocation],
        risk_free_rate: f64,
    ) -> Self {
        let total_return = match equity_curve.last() {
            Some(last) if initial_capital > 0.0 => last.equity / initial_capital - 1.0,
            _ => 0.0,
        };

        let years = equity_curve.len() as f64 / TRADING_DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return.is_finite() && total_return > -1.0 {
            (1.0 + total_return).powf(years.recip()) - 1.0
        } else {
            0.0
        };

        let returns = period_returns(initial_capital, equity_curve);
        let (max_drawdown, max_drawdown_duration) = compute_drawdown(initial_capital, equity_curve);
        let (sharpe_ratio, sortino_ratio) =
            compute_risk_adjusted(&returns, risk_free_rate / TRADING_DAYS_PER_YEAR);
        let calmar_ratio = if max_drawdown > 0.0 {
            annualized_return / max_drawdown
        } else {
            0.0
        };

        let winning = returns.iter().filter(|r| **r > 0.0).count();
        let win_rate = if returns.is_empty() {
            0.0
        } else {
            winning as f64 / returns.len() as f64
        };
        let (best_day, worst_day) = returns
            .iter()
            .fold(None, |range: Option<(f64, f64)>, &r| match range {
                Some((best, worst)) => Some((best.max(r), worst.min(r))),
                None => Some((r, r)),
            })
            .unwrap_or((0.0, 0.0));

        let invested = |w: &Allocation| total_weight(w) > REBALANCE_EPSILON;
        let time_in_market = mean(daily_weights.iter().map(|w| if invested(w) { 1.0 } else { 0.0 }));
        let avg_holdings = mean(
            daily_weights
                .iter()
                .map(|w| w.values().filter(|v| **v > REBALANCE_EPSILON).count() as f64),
        );
        // One-way turnover between consecutive days; the first entry is not a
        // rotation.
        let avg_turnover = mean(
            daily_weights
                .windows(2)
                .map(|pair| turnover(&pair[0], &pair[1]) / 2.0),
        );

        Metrics {
            total_return,
            annualized_return,
            annualized_volatility: sample_deviation(&returns) * TRADING_DAYS_PER_YEAR.sqrt(),
            sharpe_ratio,
            sortino_ratio,
            calmar_ratio,
            max_drawdown,
            max_drawdown_duration,
            win_rate,
            best_day,
            worst_day,
            avg_turnover,
            avg_holdings,
            time_in_market,
            rebalance_count: count_rebalances(daily_weights),
            trading_days: equity_curve.len(),
        }
    }

    pub fn from_result(result: &BacktestResult, risk_free_rate: f64) -> Self {
        Self::compute(
            result.initial_capital,
            &result.equity_curve,
            &result.daily_weights,
            risk_free_rate,
        )
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

fn sample_deviation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Days whose weights differ from the previous day's. The first day counts
/// when it holds anything.
fn count_rebalances(daily_weights: &[Allocation]) -> usize {
    let empty = Allocation::new();
    let mut previous = &empty;
    let mut count = 0;
    for weights in daily_weights {
        let changed = weights
            .keys()
            .chain(previous.keys())
            .any(|t| {
                let a = weights.get(t).copied().unwrap_or(0.0);
                let b = previous.get(t).copied().unwrap_or(0.0);
                (a - b).abs() > REBALANCE_EPSILON
            });
        if changed {
            count += 1;
        }
        previous = weights;
    }
    count
}

/// Deepest peak-to-trough loss and the longest run of days spent below a
/// prior peak. The starting capital is the first peak; a new high (or a
/// tie) ends the run.
fn compute_drawdown(initial_capital: f64, equity_curve: &[EquityPoint]) -> (f64, i64) {
    let mut high_water = initial_capital;
    let mut underwater = 0i64;
    let mut deepest = 0.0_f64;
    let mut longest = 0i64;

    for equity in equity_curve.iter().map(|p| p.equity) {
        if equity >= high_water {
            high_water = equity;
            underwater = 0;
            continue;
        }
        if high_water <= 0.0 {
            continue;
        }
        underwater += 1;
        longest = longest.max(underwater);
        deepest = deepest.max(1.0 - equity / high_water);
    }

    (deepest, longest)
}

/// Simple day-over-day returns, the first measured against the starting
/// capital.
fn period_returns(initial_capital: f64, equity_curve: &[EquityPoint]) -> Vec<f64> {
    let mut previous = initial_capital;
    equity_curve
        .iter()
        .map(|point| {
            let r = if previous > 0.0 {
                point.equity / previous - 1.0
            } else {
                0.0
            };
            previous = point.equity;
            r
        })
        .collect()
}

fn annualized_ratio(excess: f64, deviation: f64) -> f64 {
    if deviation > 0.0 {
        excess / deviation * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    }
}

/// Annualized Sharpe and Sortino ratios. Both use population deviations;
/// Sortino only penalizes days below the daily risk-free rate.
fn compute_risk_adjusted(returns: &[f64], daily_rf: f64) -> (f64, f64) {
    if returns.is_empty() {
        return (0.0, 0.0);
    }

    let count = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / count;
    let excess = mean - daily_rf;

    let (total_sq, downside_sq) = returns.iter().fold((0.0, 0.0), |(total, down), r| {
        let shortfall = (r - daily_rf).min(0.0);
        (total + (r - mean).powi(2), down + shortfall * shortfall)
    });

    (
        annualized_ratio(excess, (total_sq / count).sqrt()),
        annualized_ratio(excess, (downside_sq / count).sqrt()),
    )
}
