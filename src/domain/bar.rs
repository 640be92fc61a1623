//! Daily price bar representation.

use chrono::NaiveDate;

/// One trading day as read from the data source. `adj_close` carries splits
/// and dividends; the other prices are raw.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
}
