#![allow(dead_code)]

use chrono::NaiveDate;
use flowtrader::domain::bar::Bar;
use flowtrader::domain::condition::{Comparator, Condition, ConditionKind, IndicatorRef};
use flowtrader::domain::error::FlowError;
use flowtrader::domain::flow::{FlowNode, NodeKind, Weighting, into_slot};
use flowtrader::domain::indicator::Metric;
use flowtrader::domain::price_matrix::{PriceMatrix, build_price_matrix};
use flowtrader::ports::data_port::DataPort;
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<Bar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, ticker: &str, bars: Vec<Bar>) -> Self {
        self.data.insert(ticker.to_string(), bars);
        self
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        ticker: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, FlowError> {
        if let Some(reason) = self.errors.get(ticker) {
            return Err(FlowError::DataSource {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(ticker)
            .map(|bars| {
                bars.iter()
                    .filter(|b| start_date.is_none_or(|s| b.date >= s))
                    .filter(|b| end_date.is_none_or(|e| b.date <= e))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_tickers(&self) -> Result<Vec<String>, FlowError> {
        let mut tickers: Vec<String> = self.data.keys().cloned().collect();
        tickers.sort();
        Ok(tickers)
    }

    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, FlowError> {
        match self.data.get(ticker) {
            Some(bars) if !bars.is_empty() => {
                let min = bars.iter().map(|b| b.date).min().unwrap();
                let max = bars.iter().map(|b| b.date).max().unwrap();
                Ok(Some((min, max, bars.len())))
            }
            _ => Ok(None),
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// A flat bar where every price equals `close`.
pub fn make_bar(day: NaiveDate, close: f64) -> Bar {
    Bar {
        date: day,
        open: close,
        high: close,
        low: close,
        close,
        adj_close: close,
    }
}

/// Consecutive calendar days starting 2024-01-01, one bar per close.
pub fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_bar(date(2024, 1, 1) + chrono::Duration::days(i as i64), c))
        .collect()
}

pub fn series_map(entries: &[(&str, &[f64])]) -> HashMap<String, Vec<Bar>> {
    entries
        .iter()
        .map(|(t, closes)| (t.to_string(), bars_from_closes(closes)))
        .collect()
}

/// Price matrix anchored on every ticker in `entries`.
pub fn matrix_from(entries: &[(&str, &[f64])]) -> PriceMatrix {
    let anchors: Vec<String> = entries.iter().map(|(t, _)| t.to_string()).collect();
    build_price_matrix(&series_map(entries), &anchors).unwrap()
}

/// One ticker from (close, distance to high, distance to low) triples.
pub fn ranged_matrix(ticker: &str, bars: &[(f64, f64, f64)]) -> PriceMatrix {
    let bars: Vec<Bar> = bars
        .iter()
        .enumerate()
        .map(|(i, &(close, up, down))| Bar {
            date: date(2024, 1, 1) + chrono::Duration::days(i as i64),
            open: close,
            high: close + up,
            low: close - down,
            close,
            adj_close: close,
        })
        .collect();
    let series = HashMap::from([(ticker.to_string(), bars)]);
    build_price_matrix(&series, &[ticker.to_string()]).unwrap()
}

pub fn mock_port(entries: &[(&str, &[f64])]) -> MockDataPort {
    entries.iter().fold(MockDataPort::new(), |port, (t, closes)| {
        port.with_bars(t, bars_from_closes(closes))
    })
}

pub fn cond(
    kind: ConditionKind,
    metric: Metric,
    window: i64,
    ticker: &str,
    comparator: Comparator,
    threshold: f64,
) -> Condition {
    Condition::threshold(
        kind,
        IndicatorRef::new(metric, window, ticker),
        comparator,
        threshold,
    )
}

pub fn if_cond(metric: Metric, window: i64, ticker: &str, cmp: Comparator, t: f64) -> Condition {
    cond(ConditionKind::If, metric, window, ticker, cmp, t)
}

pub fn indicator_node(
    id: &str,
    conditions: Vec<Condition>,
    then: Vec<FlowNode>,
    otherwise: Vec<FlowNode>,
) -> FlowNode {
    FlowNode::new(
        id,
        NodeKind::Indicator {
            conditions,
            weighting_then: Weighting::Equal,
            weighting_else: Weighting::Equal,
            then: into_slot(then),
            otherwise: into_slot(otherwise),
        },
    )
}

pub fn alt_exit_node(
    id: &str,
    entry: Vec<Condition>,
    exit: Vec<Condition>,
    then: Vec<FlowNode>,
    otherwise: Vec<FlowNode>,
) -> FlowNode {
    FlowNode::new(
        id,
        NodeKind::AltExit {
            entry,
            exit,
            weighting_then: Weighting::Equal,
            weighting_else: Weighting::Equal,
            then: into_slot(then),
            otherwise: into_slot(otherwise),
        },
    )
}

pub fn scaling_node(
    id: &str,
    indicator: IndicatorRef,
    scale_from: f64,
    scale_to: f64,
    then: Vec<FlowNode>,
    otherwise: Vec<FlowNode>,
) -> FlowNode {
    FlowNode::new(
        id,
        NodeKind::Scaling {
            indicator,
            scale_from,
            scale_to,
            weighting_then: Weighting::Equal,
            weighting_else: Weighting::Equal,
            then: into_slot(then),
            otherwise: into_slot(otherwise),
        },
    )
}

pub fn weight(allocation: &flowtrader::domain::weighting::Allocation, ticker: &str) -> f64 {
    allocation.get(ticker).copied().unwrap_or(0.0)
}
