//! Linear-regression slope.
//!
//! Least-squares slope of the last n values against x = 0..n-1. Σy and Σxy
//! slide in O(1): dropping y_out and shifting every x down by one gives
//! Σxy' = Σxy - (Σy - y_out) + (n-1)·y_in.
//! Undefined while any value in the window is missing. Needs n ≥ 2.

use crate::domain::indicator::finite;

pub fn calculate_slope(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period < 2 {
        return out;
    }

    let n = period as f64;
    let sum_x = n * (n - 1.0) / 2.0;
    let sum_xx = (n - 1.0) * n * (2.0 * n - 1.0) / 6.0;
    let denom = n * sum_xx - sum_x * sum_x;

    let mut run = 0usize;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;

    for (i, value) in values.iter().enumerate() {
        let Some(y) = finite(*value) else {
            run = 0;
            sum_y = 0.0;
            sum_xy = 0.0;
            continue;
        };

        run += 1;
        if run <= period {
            sum_xy += (run - 1) as f64 * y;
            sum_y += y;
        } else {
            let y_out = values[i - period].unwrap_or(0.0);
            sum_xy = sum_xy - (sum_y - y_out) + (n - 1.0) * y;
            sum_y = sum_y - y_out + y;
        }

        if run >= period {
            out[i] = Some((n * sum_xy - sum_x * sum_y) / denom);
        }
    }

    out
}
