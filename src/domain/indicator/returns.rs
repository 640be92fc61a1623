//! Return-based metrics: cumulative return and volatility of daily returns.
//!
//! Both are expressed in percent.

use crate::domain::indicator::finite;
use crate::domain::indicator::stddev::calculate_stddev_raw;

/// Daily percent change; undefined when either day is missing.
pub fn daily_returns(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    for i in 1..values.len() {
        if let (Some(prev), Some(curr)) = (finite(values[i - 1]), finite(values[i])) {
            if prev != 0.0 {
                out[i] = Some((curr / prev - 1.0) * 100.0);
            }
        }
    }
    out
}

/// Percent change over the last n days. Every day in between must be
/// present.
pub fn calculate_cumulative_return(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }

    let mut run = 0usize;
    for (i, value) in values.iter().enumerate() {
        let Some(curr) = finite(*value) else {
            run = 0;
            continue;
        };
        run += 1;
        if run > period {
            let base = values[i - period].unwrap_or(0.0);
            if base != 0.0 {
                out[i] = Some((curr / base - 1.0) * 100.0);
            }
        }
    }
    out
}

/// Population standard deviation of the last n daily returns.
pub fn calculate_stddev_return(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    calculate_stddev_raw(&daily_returns(values), period)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().map(|v| Some(*v)).collect()
    }

    #[test]
    fn daily_returns_percent() {
        let out = daily_returns(&series(&[100.0, 110.0, 99.0]));
        assert_eq!(out[0], None);
        assert!((out[1].unwrap() - 10.0).abs() < 1e-9);
        assert!((out[2].unwrap() + 10.0).abs() < 1e-9);
    }

    #[test]
    fn cumulative_return_over_window() {
        let out = calculate_cumulative_return(&series(&[100.0, 105.0, 120.0, 90.0]), 2);
        assert_eq!(out[1], None);
        assert!((out[2].unwrap() - 20.0).abs() < 1e-9);
        assert!((out[3].unwrap() - (90.0 / 105.0 - 1.0) * 100.0).abs() < 1e-9);
    }

    #[test]
    fn cumulative_return_requires_unbroken_window() {
        let values = vec![Some(100.0), None, Some(120.0), Some(130.0)];
        let out = calculate_cumulative_return(&values, 2);
        assert!(out.iter().all(Option::is_none));
    }

    #[test]
    fn stddev_return_first_defined_at_period() {
        let out = calculate_stddev_return(&series(&[100.0, 101.0, 100.0, 102.0, 101.0]), 3);
        assert!(out[..3].iter().all(Option::is_none));
        assert!(out[3].is_some());
    }

    #[test]
    fn stddev_return_constant_growth_is_zero() {
        let values: Vec<f64> = (0..6).map(|i| 100.0 * 1.01f64.powi(i)).collect();
        let out = calculate_stddev_return(&series(&values), 3);
        assert!(out[5].unwrap().abs() < 1e-6);
    }
}
