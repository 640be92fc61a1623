//! Price matrix and common trading-date domain.
//!
//! The domain is the intersection of trading dates across the anchor
//! tickers, bounded by the latest anchor start and the earliest anchor end.
//! Every ticker, anchor or not, is then re-sampled onto that domain with
//! `None` where it has no bar.

use crate::domain::bar::Bar;
use crate::domain::error::FlowError;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TickerPrices {
    pub open: Vec<Option<f64>>,
    pub high: Vec<Option<f64>>,
    pub low: Vec<Option<f64>>,
    pub close: Vec<Option<f64>>,
    pub adj_close: Vec<Option<f64>>,
}

impl TickerPrices {
    fn with_len(len: usize) -> Self {
        Self {
            open: vec![None; len],
            high: vec![None; len],
            low: vec![None; len],
            close: vec![None; len],
            adj_close: vec![None; len],
        }
    }

    /// Open price rescaled onto the adjusted-close basis of the same day.
    pub fn adjusted_open(&self, index: usize) -> Option<f64> {
        let open = self.open.get(index).copied().flatten()?;
        let close = self.close.get(index).copied().flatten()?;
        let adj = self.adj_close.get(index).copied().flatten()?;
        if close == 0.0 {
            return Some(open);
        }
        Some(open * adj / close)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PriceMatrix {
    pub dates: Vec<NaiveDate>,
    pub prices: HashMap<String, TickerPrices>,
    pub limiting_ticker: Option<String>,
}

impl PriceMatrix {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn ticker(&self, ticker: &str) -> Option<&TickerPrices> {
        self.prices.get(ticker)
    }
}

pub fn build_price_matrix(
    series: &HashMap<String, Vec<Bar>>,
    anchor_tickers: &[String],
) -> Result<PriceMatrix, FlowError> {
    for (ticker, bars) in series {
        check_ordering(ticker, bars)?;
    }

    let mut seen = HashSet::new();
    let anchors: Vec<&str> = anchor_tickers
        .iter()
        .map(String::as_str)
        .filter(|t| seen.insert(*t))
        .collect();

    let Some((start, end, limiting)) = anchor_bounds(series, &anchors) else {
        tracing::warn!(anchors = anchors.len(), "anchor tickers have no common history");
        return Ok(empty_matrix(series));
    };

    let anchor_dates: Vec<HashSet<NaiveDate>> = anchors
        .iter()
        .filter(|t| **t != limiting)
        .filter_map(|t| series.get(*t))
        .map(|bars| bars.iter().map(|b| b.date).collect())
        .collect();

    let dates: Vec<NaiveDate> = series
        .get(limiting)
        .map(|bars| {
            bars.iter()
                .map(|b| b.date)
                .filter(|d| *d >= start && *d <= end)
                .filter(|d| anchor_dates.iter().all(|set| set.contains(d)))
                .collect()
        })
        .unwrap_or_default();

    if dates.is_empty() {
        tracing::warn!(limiting, "anchor tickers share no trading dates");
        return Ok(empty_matrix(series));
    }

    let prices = series
        .iter()
        .map(|(ticker, bars)| (ticker.clone(), resample(bars, &dates)))
        .collect();

    tracing::debug!(
        days = dates.len(),
        limiting,
        %start,
        %end,
        "built price matrix"
    );

    Ok(PriceMatrix {
        dates,
        prices,
        limiting_ticker: Some(limiting.to_string()),
    })
}

fn check_ordering(ticker: &str, bars: &[Bar]) -> Result<(), FlowError> {
    for pair in bars.windows(2) {
        if pair[1].date <= pair[0].date {
            return Err(FlowError::UnorderedBars {
                ticker: ticker.to_string(),
                date: pair[1].date.to_string(),
            });
        }
    }
    Ok(())
}

/// (latest first date, earliest last date, limiting ticker) across anchors.
fn anchor_bounds<'a>(
    series: &HashMap<String, Vec<Bar>>,
    anchors: &[&'a str],
) -> Option<(NaiveDate, NaiveDate, &'a str)> {
    let mut start: Option<(NaiveDate, &'a str)> = None;
    let mut end: Option<NaiveDate> = None;

    for &ticker in anchors {
        let bars = series.get(ticker).filter(|b| !b.is_empty())?;
        let first = bars[0].date;
        let last = bars[bars.len() - 1].date;
        if start.is_none_or(|(s, _)| first > s) {
            start = Some((first, ticker));
        }
        if end.is_none_or(|e| last < e) {
            end = Some(last);
        }
    }

    let (start, limiting) = start?;
    let end = end?;
    (start <= end).then_some((start, end, limiting))
}

fn resample(bars: &[Bar], dates: &[NaiveDate]) -> TickerPrices {
    let index: HashMap<NaiveDate, &Bar> = bars.iter().map(|b| (b.date, b)).collect();
    let mut prices = TickerPrices::with_len(dates.len());
    for (i, date) in dates.iter().enumerate() {
        if let Some(bar) = index.get(date) {
            prices.open[i] = Some(bar.open);
            prices.high[i] = Some(bar.high);
            prices.low[i] = Some(bar.low);
            prices.close[i] = Some(bar.close);
            prices.adj_close[i] = Some(bar.adj_close);
        }
    }
    prices
}

fn empty_matrix(series: &HashMap<String, Vec<Bar>>) -> PriceMatrix {
    PriceMatrix {
        dates: Vec::new(),
        prices: series
            .keys()
            .map(|t| (t.clone(), TickerPrices::default()))
            .collect(),
        limiting_ticker: None,
    }
}
