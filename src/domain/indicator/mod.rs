//! Technical indicator implementations.
//!
//! Every indicator maps a domain-aligned series (`None` = missing) onto a
//! series of the same length. Index `i` is `Some` only once enough trailing
//! non-missing values have been seen; a missing value resets the rolling
//! state instead of being read as zero.
//!
//! - `Metric`: the user-facing metric identifier stored in strategy trees
//! - `IndicatorType`: metric + parameters, used as the cache key
//! - `IndicatorSeries`: a computed output series

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod returns;
pub mod rsi;
pub mod slope;
pub mod sma;
pub mod stddev;

pub use ema::calculate_ema;
pub use sma::calculate_sma;

use crate::domain::error::FlowError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bollinger band width in standard deviations, scaled by 100.
pub const BOLLINGER_MULT_X100: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    CurrentPrice,
    Sma,
    Ema,
    Rsi,
    StdDev,
    BollingerPctB,
    Atr,
    Adx,
    MacdHistogram,
    Slope,
    CumulativeReturn,
    StdDevReturn,
}

impl Metric {
    /// Metrics whose output does not depend on the window.
    pub fn ignores_window(self) -> bool {
        matches!(self, Metric::CurrentPrice | Metric::MacdHistogram)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Price,
    Sma(usize),
    Ema(usize),
    Rsi(usize),
    Stddev(usize),
    Bollinger {
        period: usize,
        stddev_mult_x100: u32,
    },
    Atr(usize),
    Adx(usize),
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Slope(usize),
    CumulativeReturn(usize),
    StddevReturn(usize),
}

impl IndicatorType {
    /// Resolve a metric and a raw window into a concrete indicator.
    ///
    /// Windows are validated here so that a bad tree is rejected before any
    /// date loop starts.
    pub fn new(metric: Metric, window: i64) -> Result<Self, FlowError> {
        // A slope needs two points to fit a line.
        let min = if metric == Metric::Slope { 2 } else { 1 };
        let period = || {
            if window < min {
                Err(FlowError::InvalidWindow {
                    context: format!("{metric:?}"),
                    window,
                    min,
                })
            } else {
                Ok(window as usize)
            }
        };
        Ok(match metric {
            Metric::CurrentPrice => IndicatorType::Price,
            Metric::MacdHistogram => IndicatorType::Macd {
                fast: macd::DEFAULT_FAST,
                slow: macd::DEFAULT_SLOW,
                signal: macd::DEFAULT_SIGNAL,
            },
            Metric::Sma => IndicatorType::Sma(period()?),
            Metric::Ema => IndicatorType::Ema(period()?),
            Metric::Rsi => IndicatorType::Rsi(period()?),
            Metric::StdDev => IndicatorType::Stddev(period()?),
            Metric::BollingerPctB => IndicatorType::Bollinger {
                period: period()?,
                stddev_mult_x100: BOLLINGER_MULT_X100,
            },
            Metric::Atr => IndicatorType::Atr(period()?),
            Metric::Adx => IndicatorType::Adx(period()?),
            Metric::Slope => IndicatorType::Slope(period()?),
            Metric::CumulativeReturn => IndicatorType::CumulativeReturn(period()?),
            Metric::StdDevReturn => IndicatorType::StddevReturn(period()?),
        })
    }

    /// Index of the first defined value on a gap-free series.
    pub fn first_defined_index(&self) -> usize {
        match *self {
            IndicatorType::Price => 0,
            IndicatorType::Sma(n)
            | IndicatorType::Ema(n)
            | IndicatorType::Stddev(n)
            | IndicatorType::Atr(n)
            | IndicatorType::Slope(n) => n - 1,
            IndicatorType::Bollinger { period, .. } => period - 1,
            IndicatorType::Rsi(n)
            | IndicatorType::CumulativeReturn(n)
            | IndicatorType::StddevReturn(n) => n,
            IndicatorType::Adx(n) => 2 * n - 1,
            IndicatorType::Macd { slow, signal, .. } => slow - 1 + signal - 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<Option<f64>>,
}

impl IndicatorSeries {
    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied().flatten()
    }
}

/// Treat NaN and infinities as missing data.
pub(crate) fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Price => write!(f, "PRICE"),
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Stddev(period) => write!(f, "STDDEV({})", period),
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => {
                let mult = *stddev_mult_x100 as f64 / 100.0;
                write!(f, "BOLLINGER_PCTB({},{})", period, mult)
            }
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::Adx(period) => write!(f, "ADX({})", period),
            IndicatorType::Macd { fast, slow, signal } => {
                write!(f, "MACD_HIST({},{},{})", fast, slow, signal)
            }
            IndicatorType::Slope(period) => write!(f, "SLOPE({})", period),
            IndicatorType::CumulativeReturn(period) => write!(f, "CUMRET({})", period),
            IndicatorType::StddevReturn(period) => write!(f, "STDDEV_RET({})", period),
        }
    }
}
