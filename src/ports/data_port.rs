//! Data access port trait.

use crate::domain::bar::Bar;
use crate::domain::error::FlowError;
use chrono::NaiveDate;

pub trait DataPort {
    /// Bars for `ticker` in ascending date order, optionally clipped to
    /// `[start_date, end_date]`. An unknown ticker yields an empty vector.
    fn fetch_bars(
        &self,
        ticker: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, FlowError>;

    fn list_tickers(&self) -> Result<Vec<String>, FlowError>;

    /// First date, last date and bar count, or `None` when there is no data.
    fn get_data_range(&self, ticker: &str)
    -> Result<Option<(NaiveDate, NaiveDate, usize)>, FlowError>;
}
