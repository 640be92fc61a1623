//! CSV report adapter implementing ReportPort.
//!
//! Writes one row per evaluated day (`date,equity,cash,<tickers...>`) to the
//! output path, and a `metric,value` summary beside it with the extension
//! `metrics.csv`.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::FlowError;
use crate::domain::flow::Strategy;
use crate::domain::metrics::Metrics;
use crate::domain::weighting::total_weight;
use crate::ports::report_port::ReportPort;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }

    pub fn metrics_path(output_path: &Path) -> PathBuf {
        output_path.with_extension("metrics.csv")
    }
}

fn csv_error(path: &Path, err: csv::Error) -> FlowError {
    FlowError::Io(std::io::Error::other(format!(
        "failed to write {}: {}",
        path.display(),
        err
    )))
}

fn write_daily(path: &Path, result: &BacktestResult) -> Result<(), FlowError> {
    let tickers: BTreeSet<&str> = result
        .daily_weights
        .iter()
        .flat_map(|w| w.keys().map(String::as_str))
        .collect();

    let mut wtr = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;

    let mut header = vec!["date", "equity", "cash"];
    header.extend(tickers.iter().copied());
    wtr.write_record(&header).map_err(|e| csv_error(path, e))?;

    for ((date, weights), point) in result
        .dates
        .iter()
        .zip(&result.daily_weights)
        .zip(&result.equity_curve)
    {
        let mut row = vec![
            date.format("%Y-%m-%d").to_string(),
            format!("{:.6}", point.equity),
            format!("{:.6}", (1.0 - total_weight(weights)).max(0.0)),
        ];
        row.extend(
            tickers
                .iter()
                .map(|t| format!("{:.6}", weights.get(*t).copied().unwrap_or(0.0))),
        );
        wtr.write_record(&row).map_err(|e| csv_error(path, e))?;
    }

    wtr.flush()?;
    Ok(())
}

fn write_metrics(path: &Path, metrics: &Metrics, strategy: &Strategy) -> Result<(), FlowError> {
    let mut wtr = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    let rows = [
        ("strategy", strategy.name.clone()),
        ("total_return", format!("{:.6}", metrics.total_return)),
        ("annualized_return", format!("{:.6}", metrics.annualized_return)),
        (
            "annualized_volatility",
            format!("{:.6}", metrics.annualized_volatility),
        ),
        ("sharpe_ratio", format!("{:.6}", metrics.sharpe_ratio)),
        ("sortino_ratio", format!("{:.6}", metrics.sortino_ratio)),
        ("calmar_ratio", format!("{:.6}", metrics.calmar_ratio)),
        ("max_drawdown", format!("{:.6}", metrics.max_drawdown)),
        (
            "max_drawdown_duration",
            metrics.max_drawdown_duration.to_string(),
        ),
        ("win_rate", format!("{:.6}", metrics.win_rate)),
        ("best_day", format!("{:.6}", metrics.best_day)),
        ("worst_day", format!("{:.6}", metrics.worst_day)),
        ("avg_turnover", format!("{:.6}", metrics.avg_turnover)),
        ("avg_holdings", format!("{:.6}", metrics.avg_holdings)),
        ("time_in_market", format!("{:.6}", metrics.time_in_market)),
        ("rebalance_count", metrics.rebalance_count.to_string()),
        ("trading_days", metrics.trading_days.to_string()),
    ];

    wtr.write_record(["metric", "value"])
        .map_err(|e| csv_error(path, e))?;
    for (key, value) in rows {
        wtr.write_record([key, value.as_str()])
            .map_err(|e| csv_error(path, e))?;
    }
    wtr.flush()?;
    Ok(())
}

impl ReportPort for CsvReportAdapter {
    fn write(
        &self,
        result: &BacktestResult,
        metrics: &Metrics,
        strategy: &Strategy,
        output_path: &str,
    ) -> Result<(), FlowError> {
        let path = Path::new(output_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        write_daily(path, result)?;
        let metrics_path = Self::metrics_path(path);
        write_metrics(&metrics_path, metrics, strategy)?;

        tracing::info!(
            output = %path.display(),
            metrics = %metrics_path.display(),
            rows = result.dates.len(),
            "report written"
        );
        Ok(())
    }
}
