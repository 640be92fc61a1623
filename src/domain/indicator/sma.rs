//! Simple Moving Average.
//!
//! SMA(n)[i] = mean of the last n values, kept as a sliding sum.
//! Warmup: first (n-1) values are undefined; a gap restarts the warmup.

use crate::domain::indicator::finite;

pub fn calculate_sma(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }

    let mut sum = 0.0;
    let mut run = 0usize;

    for (i, value) in values.iter().enumerate() {
        match finite(*value) {
            Some(v) => {
                sum += v;
                run += 1;
                if run > period {
                    sum -= values[i - period].unwrap_or(0.0);
                }
                if run >= period {
                    out[i] = Some(sum / period as f64);
                }
            }
            None => {
                sum = 0.0;
                run = 0;
            }
        }
    }

    out
}
