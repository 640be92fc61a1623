//! Condition data structures.
//!
//! A condition compares an indicator (metric + window + ticker) against either
//! a literal threshold or, in expanded form, a second indicator. Condition
//! lists are chained by each entry's `type` tag; the first entry is `if`.

use crate::domain::error::FlowError;
use crate::domain::indicator::{IndicatorType, Metric};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionKind {
    If,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparator {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
    CrossesAbove,
    CrossesBelow,
}

/// Tolerance used by `==` and `!=`.
pub const EQ_EPSILON: f64 = 1e-9;

impl Comparator {
    /// The plain relation for one day. Crossing comparators use the
    /// underlying strict inequality; the day-over-day change is handled by
    /// the evaluator.
    pub fn holds(self, left: f64, right: f64) -> bool {
        match self {
            Comparator::Gt | Comparator::CrossesAbove => left > right,
            Comparator::Ge => left >= right,
            Comparator::Lt | Comparator::CrossesBelow => left < right,
            Comparator::Le => left <= right,
            Comparator::Eq => (left - right).abs() < EQ_EPSILON,
            Comparator::Ne => (left - right).abs() >= EQ_EPSILON,
        }
    }

    pub fn is_crossing(self) -> bool {
        matches!(self, Comparator::CrossesAbove | Comparator::CrossesBelow)
    }
}

impl FromStr for Comparator {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">" => Ok(Comparator::Gt),
            ">=" => Ok(Comparator::Ge),
            "<" => Ok(Comparator::Lt),
            "<=" => Ok(Comparator::Le),
            "==" | "=" => Ok(Comparator::Eq),
            "!=" => Ok(Comparator::Ne),
            "crossesAbove" => Ok(Comparator::CrossesAbove),
            "crossesBelow" => Ok(Comparator::CrossesBelow),
            other => Err(FlowError::InvalidComparator(other.to_string())),
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Eq => "==",
            Comparator::Ne => "!=",
            Comparator::CrossesAbove => "crossesAbove",
            Comparator::CrossesBelow => "crossesBelow",
        };
        f.write_str(s)
    }
}

impl Serialize for Comparator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Comparator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// An indicator applied to one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorRef {
    pub metric: Metric,
    #[serde(default)]
    pub window: i64,
    pub ticker: String,
}

impl IndicatorRef {
    pub fn new(metric: Metric, window: i64, ticker: impl Into<String>) -> Self {
        Self {
            metric,
            window,
            ticker: ticker.into(),
        }
    }

    pub fn indicator_type(&self) -> Result<IndicatorType, FlowError> {
        IndicatorType::new(self.metric, self.window)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rhs {
    Threshold(f64),
    Indicator(IndicatorRef),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: ConditionKind,
    #[serde(flatten)]
    pub lhs: IndicatorRef,
    pub comparator: Comparator,
    pub rhs: Rhs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sustained_days: Option<u32>,
}

impl Condition {
    pub fn threshold(
        kind: ConditionKind,
        lhs: IndicatorRef,
        comparator: Comparator,
        threshold: f64,
    ) -> Self {
        Self {
            kind,
            lhs,
            comparator,
            rhs: Rhs::Threshold(threshold),
            sustained_days: None,
        }
    }

    pub fn sustained(mut self, days: u32) -> Self {
        self.sustained_days = Some(days);
        self
    }

    /// Every ticker this condition reads.
    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        let rhs = match &self.rhs {
            Rhs::Indicator(r) => Some(r.ticker.as_str()),
            Rhs::Threshold(_) => None,
        };
        std::iter::once(self.lhs.ticker.as_str()).chain(rhs)
    }
}
