//! Bollinger %B.
//!
//! Bands are SMA(n) ± k × sigma(n) with population sigma (divides by N).
//! %B = (price - lower) / (upper - lower), undefined when the bands coincide.
//!
//! Warmup: first (period-1) values are invalid.

use crate::domain::indicator::finite;
use crate::domain::indicator::stddev::rolling_moments;

pub fn calculate_bollinger_pct_b(
    values: &[Option<f64>],
    period: usize,
    stddev_mult_x100: u32,
) -> Vec<Option<f64>> {
    let mult = stddev_mult_x100 as f64 / 100.0;

    rolling_moments(values, period)
        .into_iter()
        .zip(values)
        .map(|(moments, price)| {
            let (middle, stddev) = moments?;
            let price = finite(*price)?;
            let upper = middle + mult * stddev;
            let lower = middle - mult * stddev;
            let width = upper - lower;
            (width > 0.0).then(|| (price - lower) / width)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().map(|v| Some(*v)).collect()
    }

    #[test]
    fn bollinger_warmup() {
        let out = calculate_bollinger_pct_b(&series(&[10.0, 20.0, 30.0, 40.0, 50.0]), 3, 200);
        assert!(out[0].is_none());
        assert!(out[1].is_none());
        assert!(out[2..].iter().all(Option::is_some));
    }

    #[test]
    fn bollinger_zero_width_undefined() {
        let out = calculate_bollinger_pct_b(&series(&[100.0; 5]), 3, 200);
        assert!(out.iter().all(Option::is_none));
    }

    #[test]
    fn bollinger_basic_calculation() {
        let out = calculate_bollinger_pct_b(&series(&[10.0, 20.0, 30.0]), 3, 200);

        let middle: f64 = 20.0;
        let variance: f64 = (100.0 + 0.0 + 100.0) / 3.0;
        let stddev = variance.sqrt();
        let lower = middle - 2.0 * stddev;
        let upper = middle + 2.0 * stddev;
        let expected = (30.0 - lower) / (upper - lower);

        assert!((out[2].unwrap() - expected).abs() < 1e-10);
    }

    #[test]
    fn bollinger_price_at_middle_is_half() {
        let out = calculate_bollinger_pct_b(&series(&[10.0, 30.0, 20.0]), 3, 200);
        assert!((out[2].unwrap() - 0.5).abs() < 1e-10);
    }

    #[test]
    fn bollinger_multiplier_variations() {
        let wide = calculate_bollinger_pct_b(&series(&[10.0, 20.0, 30.0]), 3, 300);
        let narrow = calculate_bollinger_pct_b(&series(&[10.0, 20.0, 30.0]), 3, 100);
        // Price above the middle sits further from 0.5 with narrower bands.
        assert!(narrow[2].unwrap() > wide[2].unwrap());
    }
}
