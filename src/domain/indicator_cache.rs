//! Lazily computed indicator series for one evaluation run.
//!
//! Series are keyed by (ticker, indicator) and computed on first use from
//! the price matrix, then reused across all days and tree re-traversals.
//! The cache belongs to a single run and is never shared.

use crate::domain::indicator::adx::calculate_adx;
use crate::domain::indicator::atr::calculate_atr;
use crate::domain::indicator::bollinger::calculate_bollinger_pct_b;
use crate::domain::indicator::macd::calculate_macd_histogram;
use crate::domain::indicator::returns::{calculate_cumulative_return, calculate_stddev_return};
use crate::domain::indicator::rsi::calculate_rsi;
use crate::domain::indicator::slope::calculate_slope;
use crate::domain::indicator::stddev::calculate_stddev;
use crate::domain::indicator::{
    IndicatorSeries, IndicatorType, calculate_ema, calculate_sma, finite,
};
use crate::domain::price_matrix::{PriceMatrix, TickerPrices};
use std::collections::HashMap;

pub fn compute_indicator(prices: &TickerPrices, indicator_type: IndicatorType) -> IndicatorSeries {
    let price = &prices.adj_close;
    let values = match indicator_type {
        IndicatorType::Price => price.iter().map(|v| finite(*v)).collect(),
        IndicatorType::Sma(n) => calculate_sma(price, n),
        IndicatorType::Ema(n) => calculate_ema(price, n),
        IndicatorType::Rsi(n) => calculate_rsi(price, n),
        IndicatorType::Stddev(n) => calculate_stddev(price, n),
        IndicatorType::Bollinger {
            period,
            stddev_mult_x100,
        } => calculate_bollinger_pct_b(price, period, stddev_mult_x100),
        IndicatorType::Atr(n) => calculate_atr(&prices.high, &prices.low, &prices.close, n),
        IndicatorType::Adx(n) => calculate_adx(&prices.high, &prices.low, &prices.close, n),
        IndicatorType::Macd { fast, slow, signal } => {
            calculate_macd_histogram(price, fast, slow, signal)
        }
        IndicatorType::Slope(n) => calculate_slope(price, n),
        IndicatorType::CumulativeReturn(n) => calculate_cumulative_return(price, n),
        IndicatorType::StddevReturn(n) => calculate_stddev_return(price, n),
    };

    IndicatorSeries {
        indicator_type,
        values,
    }
}

pub struct IndicatorCache<'a> {
    matrix: &'a PriceMatrix,
    series: HashMap<(String, IndicatorType), IndicatorSeries>,
}

impl<'a> IndicatorCache<'a> {
    pub fn new(matrix: &'a PriceMatrix) -> Self {
        Self {
            matrix,
            series: HashMap::new(),
        }
    }

    pub fn matrix(&self) -> &'a PriceMatrix {
        self.matrix
    }

    /// The full series for `ticker`, computing it on first request. A ticker
    /// absent from the matrix yields an all-undefined series.
    pub fn series(&mut self, ticker: &str, indicator_type: IndicatorType) -> &IndicatorSeries {
        let matrix = self.matrix;
        self.series
            .entry((ticker.to_string(), indicator_type))
            .or_insert_with(|| match matrix.ticker(ticker) {
                Some(prices) => compute_indicator(prices, indicator_type),
                None => {
                    tracing::warn!(ticker, indicator = %indicator_type, "ticker not in price matrix");
                    IndicatorSeries {
                        indicator_type,
                        values: vec![None; matrix.len()],
                    }
                }
            })
    }

    pub fn value(&mut self, ticker: &str, indicator_type: IndicatorType, day: usize) -> Option<f64> {
        self.series(ticker, indicator_type).get(day)
    }
}
