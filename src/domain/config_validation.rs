//! Configuration validation.
//!
//! Validates all config fields before any data is loaded.

use crate::domain::backtest::BacktestMode;
use crate::domain::error::FlowError;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), FlowError> {
    validate_mode(config)?;
    validate_cost(config)?;
    validate_initial_capital(config)?;
    validate_risk_free_rate(config)?;
    validate_dates(config)?;
    validate_data_path(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> FlowError {
    FlowError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn validate_mode(config: &dyn ConfigPort) -> Result<(), FlowError> {
    if let Some(raw) = config.get_string("backtest", "mode") {
        raw.parse::<BacktestMode>()
            .map_err(|reason| invalid("backtest", "mode", reason))?;
    }
    Ok(())
}

fn validate_cost(config: &dyn ConfigPort) -> Result<(), FlowError> {
    let value = config.get_double("backtest", "cost_bps", 0.0);
    if !value.is_finite() || value < 0.0 {
        return Err(invalid("backtest", "cost_bps", "cost_bps must be non-negative"));
    }
    Ok(())
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), FlowError> {
    let value = config.get_double("backtest", "initial_capital", 10_000.0);
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    Ok(())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), FlowError> {
    let value = config.get_double("backtest", "risk_free_rate", 0.0);
    if !(0.0..1.0).contains(&value) {
        return Err(invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), FlowError> {
    let start_date = parse_date(config, "start_date")?;
    let end_date = parse_date(config, "end_date")?;

    if let (Some(start), Some(end)) = (start_date, end_date) {
        if start >= end {
            return Err(invalid(
                "backtest",
                "start_date",
                "start_date must be before end_date",
            ));
        }
    }
    Ok(())
}

fn parse_date(config: &dyn ConfigPort, field: &str) -> Result<Option<NaiveDate>, FlowError> {
    match config.get_string("backtest", field) {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                invalid(
                    "backtest",
                    field,
                    format!("invalid {} format, expected YYYY-MM-DD", field),
                )
            }),
    }
}

fn validate_data_path(config: &dyn ConfigPort) -> Result<(), FlowError> {
    match config.get_string("data", "path") {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(FlowError::ConfigMissing {
            section: "data".to_string(),
            key: "path".to_string(),
        }),
    }
}
