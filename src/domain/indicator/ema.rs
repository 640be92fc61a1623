//! Exponential Moving Average.
//!
//! k = 2/(n+1), seed with the SMA of the first n values, then
//! EMA[i] = V[i]*k + EMA[i-1]*(1-k).
//! Warmup: first (n-1) values are invalid. A missing value forces a reseed.

use crate::domain::indicator::finite;

pub fn calculate_ema(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = 0.0;
    let mut sum = 0.0;
    let mut run = 0usize;

    for (i, value) in values.iter().enumerate() {
        let Some(v) = finite(*value) else {
            sum = 0.0;
            run = 0;
            continue;
        };

        run += 1;
        if run < period {
            sum += v;
        } else if run == period {
            sum += v;
            ema = sum / period as f64;
            out[i] = Some(ema);
        } else {
            ema = v * k + ema * (1.0 - k);
            out[i] = Some(ema);
        }
    }

    out
}
