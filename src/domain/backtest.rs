//! Backtest driver: daily evaluation plus equity simulation.
//!
//! The allocation decided on day `i` uses data through the close of day `i`.
//! The backtest mode picks the holding interval it earns:
//!
//! | mode | holds from            | to                      | credited on |
//! |------|-----------------------|-------------------------|-------------|
//! | CC   | close[i]              | close[i+1]              | i+1         |
//! | CO   | close[i]              | open[i+1]               | i+1         |
//! | OC   | open[i+1]             | close[i+1]              | i+1         |
//! | OO   | open[i+1]             | open[i+2]               | i+2         |
//!
//! Closes are adjusted closes and opens are rescaled onto the same basis.
//! A missing price on either end earns nothing for that ticker.
//! Trading costs are `cost_bps` of turnover, charged on the day the trade
//! happens: the decision day for CC/CO, the next open for OC/OO.

use crate::domain::error::FlowError;
use crate::domain::evaluator::Evaluator;
use crate::domain::flow::Strategy;
use crate::domain::price_matrix::{PriceMatrix, TickerPrices};
use crate::domain::tree_validation::validate_strategy;
use crate::domain::weighting::Allocation;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BacktestMode {
    #[default]
    CloseToClose,
    OpenToOpen,
    OpenToClose,
    CloseToOpen,
}

impl FromStr for BacktestMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CC" => Ok(BacktestMode::CloseToClose),
            "OO" => Ok(BacktestMode::OpenToOpen),
            "OC" => Ok(BacktestMode::OpenToClose),
            "CO" => Ok(BacktestMode::CloseToOpen),
            other => Err(format!("unknown backtest mode '{}', expected CC, OO, OC or CO", other)),
        }
    }
}

impl fmt::Display for BacktestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BacktestMode::CloseToClose => "CC",
            BacktestMode::OpenToOpen => "OO",
            BacktestMode::OpenToClose => "OC",
            BacktestMode::CloseToOpen => "CO",
        };
        f.write_str(s)
    }
}

impl BacktestMode {
    /// Days between the decision and the trade.
    fn trade_lag(self) -> usize {
        match self {
            BacktestMode::CloseToClose | BacktestMode::CloseToOpen => 0,
            BacktestMode::OpenToClose | BacktestMode::OpenToOpen => 1,
        }
    }

    /// Days between the decision and the credited return.
    fn credit_lag(self) -> usize {
        match self {
            BacktestMode::OpenToOpen => 2,
            _ => 1,
        }
    }

    /// Return of one ticker for the holding interval that starts from the
    /// decision on `day`.
    fn period_return(self, prices: &TickerPrices, day: usize) -> Option<f64> {
        let close = |i: usize| prices.adj_close.get(i).copied().flatten();
        let open = |i: usize| prices.adjusted_open(i);
        let (entry, exit) = match self {
            BacktestMode::CloseToClose => (close(day)?, close(day + 1)?),
            BacktestMode::CloseToOpen => (close(day)?, open(day + 1)?),
            BacktestMode::OpenToClose => (open(day + 1)?, close(day + 1)?),
            BacktestMode::OpenToOpen => (open(day + 1)?, open(day + 2)?),
        };
        if entry > 0.0 && exit.is_finite() {
            Some(exit / entry - 1.0)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub mode: BacktestMode,
    pub cost_bps: f64,
    pub initial_capital: f64,
    pub risk_free_rate: f64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            mode: BacktestMode::CloseToClose,
            cost_bps: 0.0,
            initial_capital: 10_000.0,
            risk_free_rate: 0.0,
            start_date: None,
            end_date: None,
        }
    }
}

impl BacktestConfig {
    /// Read `[backtest]`. Values are assumed to have passed
    /// `config_validation::validate_backtest_config`.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FlowError> {
        let defaults = Self::default();
        let mode = match config.get_string("backtest", "mode") {
            Some(raw) => raw.parse().map_err(|reason| FlowError::ConfigInvalid {
                section: "backtest".into(),
                key: "mode".into(),
                reason,
            })?,
            None => defaults.mode,
        };
        Ok(Self {
            mode,
            cost_bps: config.get_double("backtest", "cost_bps", defaults.cost_bps),
            initial_capital: config.get_double(
                "backtest",
                "initial_capital",
                defaults.initial_capital,
            ),
            risk_free_rate: config.get_double("backtest", "risk_free_rate", defaults.risk_free_rate),
            start_date: config.get_date("backtest", "start_date"),
            end_date: config.get_date("backtest", "end_date"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    /// Equity before the first trade.
    pub initial_capital: f64,
    pub dates: Vec<NaiveDate>,
    pub daily_weights: Vec<Allocation>,
    pub equity_curve: Vec<EquityPoint>,
}

impl BacktestResult {
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// Sum of absolute weight changes, cash excluded.
pub fn turnover(previous: &Allocation, next: &Allocation) -> f64 {
    let mut total = 0.0;
    for (ticker, weight) in next {
        total += (weight - previous.get(ticker).copied().unwrap_or(0.0)).abs();
    }
    for (ticker, weight) in previous {
        if !next.contains_key(ticker) {
            total += weight.abs();
        }
    }
    total
}

/// Evaluate `strategy` over every day of `matrix` and simulate an equity
/// curve starting at 1.0.
pub fn evaluate_strategy(
    strategy: &Strategy,
    matrix: &PriceMatrix,
    mode: BacktestMode,
    cost_bps: f64,
) -> Result<BacktestResult, FlowError> {
    let config = BacktestConfig {
        mode,
        cost_bps,
        initial_capital: 1.0,
        ..BacktestConfig::default()
    };
    run_backtest(strategy, matrix, &config)
}

pub fn run_backtest(
    strategy: &Strategy,
    matrix: &PriceMatrix,
    config: &BacktestConfig,
) -> Result<BacktestResult, FlowError> {
    validate_strategy(strategy)?;

    if matrix.is_empty() {
        tracing::warn!(strategy = %strategy.name, "empty date domain, no simulation possible");
        return Ok(BacktestResult {
            initial_capital: config.initial_capital,
            dates: Vec::new(),
            daily_weights: Vec::new(),
            equity_curve: Vec::new(),
        });
    }

    tracing::info!(
        strategy = %strategy.name,
        days = matrix.len(),
        mode = %config.mode,
        cost_bps = config.cost_bps,
        "starting evaluation"
    );

    let mut evaluator = Evaluator::new(strategy, matrix);
    let mut daily_weights = Vec::with_capacity(matrix.len());
    for day in 0..matrix.len() {
        daily_weights.push(evaluator.evaluate_day(day)?);
    }

    let equity_curve = simulate_equity(matrix, &daily_weights, config);
    tracing::info!(
        strategy = %strategy.name,
        final_equity = equity_curve.last().map(|p| p.equity).unwrap_or(config.initial_capital),
        "evaluation complete"
    );

    Ok(BacktestResult {
        initial_capital: config.initial_capital,
        dates: matrix.dates.clone(),
        daily_weights,
        equity_curve,
    })
}

fn simulate_equity(
    matrix: &PriceMatrix,
    daily_weights: &[Allocation],
    config: &BacktestConfig,
) -> Vec<EquityPoint> {
    let len = matrix.len();
    let mode = config.mode;
    let mut growth = vec![1.0; len];
    let empty = Allocation::new();
    let mut previous = &empty;

    for (day, weights) in daily_weights.iter().enumerate() {
        let trade_day = day + mode.trade_lag();
        if trade_day < len && config.cost_bps > 0.0 {
            let traded = turnover(previous, weights);
            growth[trade_day] *= 1.0 - traded * config.cost_bps / 10_000.0;
        }
        previous = weights;

        let credit_day = day + mode.credit_lag();
        if credit_day < len {
            let portfolio_return: f64 = weights
                .iter()
                .map(|(ticker, weight)| {
                    let r = matrix
                        .ticker(ticker)
                        .and_then(|prices| mode.period_return(prices, day))
                        .unwrap_or(0.0);
                    weight * r
                })
                .sum();
            growth[credit_day] *= 1.0 + portfolio_return;
        }
    }

    let mut equity = config.initial_capital;
    matrix
        .dates
        .iter()
        .zip(growth)
        .map(|(date, g)| {
            equity *= g;
            EquityPoint {
                date: *date,
                equity,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::Bar;
    use crate::domain::flow::FlowNode;
    use crate::domain::price_matrix::build_price_matrix;
    use approx::assert_relative_eq;
    use std::collections::HashMap;

    /// Bars with distinct open and close so every mode sees different prices.
    fn matrix(bars: &[(f64, f64)]) -> PriceMatrix {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars: Vec<Bar> = bars
            .iter()
            .enumerate()
            .map(|(i, &(open, close))| Bar {
                date: start + chrono::Duration::days(i as i64),
                open,
                high: open.max(close),
                low: open.min(close),
                close,
                adj_close: close,
            })
            .collect();
        let mut series = HashMap::new();
        series.insert("SPY".to_string(), bars);
        build_price_matrix(&series, &["SPY".to_string()]).unwrap()
    }

    fn hold_spy() -> Strategy {
        Strategy::new("hold", FlowNode::position("p", &["SPY"]))
    }

    fn equities(result: &BacktestResult) -> Vec<f64> {
        result.equity_curve.iter().map(|p| p.equity).collect()
    }

    #[test]
    fn mode_parse_and_display() {
        for s in ["CC", "OO", "OC", "CO"] {
            let mode: BacktestMode = s.parse().unwrap();
            assert_eq!(mode.to_string(), s);
        }
        assert_eq!("cc".parse::<BacktestMode>().unwrap(), BacktestMode::CloseToClose);
        assert!("XX".parse::<BacktestMode>().is_err());
    }

    #[test]
    fn close_to_close_tracks_adjusted_close() {
        let m = matrix(&[(99.0, 100.0), (100.0, 110.0), (111.0, 99.0)]);
        let result = evaluate_strategy(&hold_spy(), &m, BacktestMode::CloseToClose, 0.0).unwrap();
        let eq = equities(&result);
        assert_relative_eq!(eq[0], 1.0);
        assert_relative_eq!(eq[1], 1.1, epsilon = 1e-12);
        assert_relative_eq!(eq[2], 0.99, epsilon = 1e-12);
    }

    #[test]
    fn close_to_open_earns_overnight_gap() {
        let m = matrix(&[(99.0, 100.0), (105.0, 110.0), (111.0, 99.0)]);
        let result = evaluate_strategy(&hold_spy(), &m, BacktestMode::CloseToOpen, 0.0).unwrap();
        let eq = equities(&result);
        assert_relative_eq!(eq[1], 1.05, epsilon = 1e-12);
        assert_relative_eq!(eq[2], 1.05 * 111.0 / 110.0, epsilon = 1e-12);
    }

    #[test]
    fn open_to_close_earns_next_session() {
        let m = matrix(&[(99.0, 100.0), (100.0, 110.0), (110.0, 99.0)]);
        let result = evaluate_strategy(&hold_spy(), &m, BacktestMode::OpenToClose, 0.0).unwrap();
        let eq = equities(&result);
        assert_relative_eq!(eq[0], 1.0);
        assert_relative_eq!(eq[1], 1.1, epsilon = 1e-12);
        assert_relative_eq!(eq[2], 1.1 * 0.9, epsilon = 1e-12);
    }

    #[test]
    fn open_to_open_credits_two_days_later() {
        let m = matrix(&[(99.0, 100.0), (100.0, 101.0), (120.0, 119.0), (90.0, 95.0)]);
        let result = evaluate_strategy(&hold_spy(), &m, BacktestMode::OpenToOpen, 0.0).unwrap();
        let eq = equities(&result);
        assert_relative_eq!(eq[1], 1.0);
        assert_relative_eq!(eq[2], 1.2, epsilon = 1e-12);
        assert_relative_eq!(eq[3], 1.2 * 0.75, epsilon = 1e-12);
    }

    #[test]
    fn adjusted_open_uses_adjustment_factor() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = vec![
            Bar {
                date: start,
                open: 200.0,
                high: 200.0,
                low: 200.0,
                close: 200.0,
                adj_close: 100.0,
            },
            Bar {
                date: start + chrono::Duration::days(1),
                open: 220.0,
                high: 220.0,
                low: 220.0,
                close: 220.0,
                adj_close: 110.0,
            },
        ];
        let mut series = HashMap::new();
        series.insert("SPY".to_string(), bars);
        let m = build_price_matrix(&series, &["SPY".to_string()]).unwrap();
        let result = evaluate_strategy(&hold_spy(), &m, BacktestMode::CloseToOpen, 0.0).unwrap();
        assert_relative_eq!(equities(&result)[1], 1.1, epsilon = 1e-12);
    }

    #[test]
    fn cost_charged_on_turnover() {
        let m = matrix(&[(100.0, 100.0), (100.0, 100.0), (100.0, 100.0)]);
        let result = evaluate_strategy(&hold_spy(), &m, BacktestMode::CloseToClose, 10.0).unwrap();
        let eq = equities(&result);
        // Only the initial buy trades.
        assert_relative_eq!(eq[0], 0.999, epsilon = 1e-12);
        assert_relative_eq!(eq[2], 0.999, epsilon = 1e-12);

        let metrics = crate::domain::metrics::Metrics::from_result(&result, 0.0);
        assert_relative_eq!(metrics.total_return, -0.001, epsilon = 1e-12);
    }

    #[test]
    fn turnover_counts_both_sides() {
        let a: Allocation = [("SPY".to_string(), 1.0)].into_iter().collect();
        let b: Allocation = [("TLT".to_string(), 0.5)].into_iter().collect();
        assert_relative_eq!(turnover(&a, &b), 1.5);
        assert_relative_eq!(turnover(&Allocation::new(), &a), 1.0);
        assert_relative_eq!(turnover(&a, &a), 0.0);
    }

    #[test]
    fn empty_matrix_yields_empty_result() {
        let result =
            evaluate_strategy(&hold_spy(), &PriceMatrix::default(), BacktestMode::CloseToClose, 0.0)
                .unwrap();
        assert!(result.is_empty());
        assert!(result.equity_curve.is_empty());
    }

    #[test]
    fn invalid_tree_rejected_before_loop() {
        let strategy = Strategy::new("bad", FlowNode::call("c", "missing"));
        let m = matrix(&[(1.0, 1.0)]);
        assert!(matches!(
            evaluate_strategy(&strategy, &m, BacktestMode::CloseToClose, 0.0),
            Err(FlowError::DanglingCall { .. })
        ));
    }

    #[test]
    fn config_from_ini() {
        use crate::adapters::file_config_adapter::FileConfigAdapter;
        let config = FileConfigAdapter::from_string(
            "[backtest]\nmode = OO\ncost_bps = 5\ninitial_capital = 5000\nstart_date = 2021-01-04\n",
        )
        .unwrap();
        let bt = BacktestConfig::from_config(&config).unwrap();
        assert_eq!(bt.mode, BacktestMode::OpenToOpen);
        assert_relative_eq!(bt.cost_bps, 5.0);
        assert_relative_eq!(bt.initial_capital, 5000.0);
        assert_eq!(bt.start_date, NaiveDate::from_ymd_opt(2021, 1, 4));
        assert_eq!(bt.end_date, None);
    }
}
