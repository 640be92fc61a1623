//! Rolling standard deviation.
//!
//! Population standard deviation over n values, kept as sliding sum and sum
//! of squares. The public indicator reports it in percent of the window mean
//! so that it is comparable across instruments; Bollinger %B uses the raw
//! moments.
//! Warmup: first (n-1) values are invalid.

use crate::domain::indicator::finite;

/// Variances this small relative to the squared mean are rounding noise.
const VARIANCE_EPSILON: f64 = 1e-12;

/// Rolling (mean, population standard deviation) in raw units.
pub(crate) fn rolling_moments(values: &[Option<f64>], period: usize) -> Vec<Option<(f64, f64)>> {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }

    let n = period as f64;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let mut run = 0usize;

    for (i, value) in values.iter().enumerate() {
        let Some(v) = finite(*value) else {
            sum = 0.0;
            sum_sq = 0.0;
            run = 0;
            continue;
        };

        sum += v;
        sum_sq += v * v;
        run += 1;
        if run > period {
            let old = values[i - period].unwrap_or(0.0);
            sum -= old;
            sum_sq -= old * old;
        }
        if run >= period {
            let mean = sum / n;
            let mut variance = (sum_sq / n - mean * mean).max(0.0);
            if variance <= VARIANCE_EPSILON * mean * mean {
                variance = 0.0;
            }
            out[i] = Some((mean, variance.sqrt()));
        }
    }

    out
}

/// STDDEV(n)[i] = sigma / mean * 100 over the trailing window.
pub fn calculate_stddev(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    rolling_moments(values, period)
        .into_iter()
        .map(|m| m.and_then(|(mean, sd)| (mean != 0.0).then(|| sd / mean.abs() * 100.0)))
        .collect()
}

/// Raw population standard deviation, for series that already are
/// percentages (e.g. daily returns).
pub fn calculate_stddev_raw(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    rolling_moments(values, period)
        .into_iter()
        .map(|m| m.map(|(_, sd)| sd))
        .collect()
}
