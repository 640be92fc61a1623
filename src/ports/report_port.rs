//! Report generation port trait.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::FlowError;
use crate::domain::flow::Strategy;
use crate::domain::metrics::Metrics;

/// Port for writing backtest reports.
pub trait ReportPort {
    fn write(
        &self,
        result: &BacktestResult,
        metrics: &Metrics,
        strategy: &Strategy,
        output_path: &str,
    ) -> Result<(), FlowError>;
}
