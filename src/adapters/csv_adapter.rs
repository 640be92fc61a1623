//! CSV file data adapter.
//!
//! One file per ticker, `<TICKER>.csv`, with a header row. `date`, `open`
//! and `close` are required; `high`, `low` and `adj_close` are optional and
//! fall back to the open/close envelope and the raw close respectively.

use crate::domain::bar::Bar;
use crate::domain::error::FlowError;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use csv::StringRecord;
use std::fs;
use std::path::PathBuf;

pub struct CsvAdapter {
    base_path: PathBuf,
}

struct Columns {
    date: usize,
    open: usize,
    high: Option<usize>,
    low: Option<usize>,
    close: usize,
    adj_close: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord, path: &str) -> Result<Self, FlowError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let required = |name: &str| {
            find(name).ok_or_else(|| data_error(format!("{path}: missing {name} column")))
        };
        Ok(Self {
            date: required("date")?,
            open: required("open")?,
            high: find("high"),
            low: find("low"),
            close: required("close")?,
            adj_close: find("adj_close").or_else(|| find("adjclose")),
        })
    }
}

fn data_error(reason: impl Into<String>) -> FlowError {
    FlowError::DataSource {
        reason: reason.into(),
    }
}

fn parse_price(record: &StringRecord, idx: usize, name: &str) -> Result<f64, FlowError> {
    let raw = record
        .get(idx)
        .ok_or_else(|| data_error(format!("missing {name} value")))?;
    raw.trim()
        .parse()
        .map_err(|e| data_error(format!("invalid {name} '{raw}': {e}")))
}

fn parse_optional(
    record: &StringRecord,
    idx: Option<usize>,
    name: &str,
) -> Result<Option<f64>, FlowError> {
    match idx {
        Some(i) if record.get(i).is_some_and(|raw| !raw.trim().is_empty()) => {
            parse_price(record, i, name).map(Some)
        }
        _ => Ok(None),
    }
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, ticker: &str) -> PathBuf {
        self.base_path.join(format!("{ticker}.csv"))
    }

    fn read_all(&self, ticker: &str) -> Result<Vec<Bar>, FlowError> {
        let path = self.csv_path(ticker);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let display = path.display().to_string();
        let content = fs::read_to_string(&path)
            .map_err(|e| data_error(format!("failed to read {display}: {e}")))?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| data_error(format!("{display}: {e}")))?
            .clone();
        let cols = Columns::from_headers(&headers, &display)?;

        let mut bars = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| data_error(format!("CSV parse error: {e}")))?;

            let date_str = record
                .get(cols.date)
                .ok_or_else(|| data_error("missing date value"))?;
            let date = NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d")
                .map_err(|e| data_error(format!("invalid date format: {e}")))?;

            let open = parse_price(&record, cols.open, "open")?;
            let close = parse_price(&record, cols.close, "close")?;
            let high = parse_optional(&record, cols.high, "high")?.unwrap_or(open.max(close));
            let low = parse_optional(&record, cols.low, "low")?.unwrap_or(open.min(close));
            let adj_close = parse_optional(&record, cols.adj_close, "adj_close")?.unwrap_or(close);

            bars.push(Bar {
                date,
                open,
                high,
                low,
                close,
                adj_close,
            });
        }

        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }
}

impl DataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        ticker: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, FlowError> {
        let mut bars = self.read_all(ticker)?;
        bars.retain(|b| {
            start_date.is_none_or(|s| b.date >= s) && end_date.is_none_or(|e| b.date <= e)
        });
        tracing::debug!(ticker, bars = bars.len(), "loaded bars");
        Ok(bars)
    }

    fn list_tickers(&self) -> Result<Vec<String>, FlowError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            data_error(format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ))
        })?;

        let mut tickers = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| data_error(format!("directory entry error: {e}")))?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if let Some(ticker) = name_str.strip_suffix(".csv") {
                tickers.push(ticker.to_string());
            }
        }

        tickers.sort();
        Ok(tickers)
    }

    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, FlowError> {
        let bars = self.read_all(ticker)?;
        Ok(match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Some((first.date, last.date, bars.len())),
            _ => None,
        })
    }
}
