//! RSI (Relative Strength Index) indicator implementation.
//!
//! Uses Wilder's smoothing for average gain/loss calculation:
//! - First average: simple mean of gains/losses over the first n changes
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI = 100
//!
//! Warmup: first n values are invalid (n changes are needed). A missing value
//! breaks the chain of changes and restarts the warmup.

use crate::domain::indicator::finite;

pub fn calculate_rsi(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }

    let n = period as f64;
    let mut prev: Option<f64> = None;
    let mut changes = 0usize;
    let mut gain_sum = 0.0;
    let mut loss_sum = 0.0;
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;

    for (i, value) in values.iter().enumerate() {
        let Some(v) = finite(*value) else {
            prev = None;
            changes = 0;
            gain_sum = 0.0;
            loss_sum = 0.0;
            continue;
        };

        if let Some(p) = prev {
            let change = v - p;
            let gain = change.max(0.0);
            let loss = (-change).max(0.0);
            changes += 1;

            if changes < period {
                gain_sum += gain;
                loss_sum += loss;
            } else if changes == period {
                gain_sum += gain;
                loss_sum += loss;
                avg_gain = gain_sum / n;
                avg_loss = loss_sum / n;
                out[i] = Some(rsi_value(avg_gain, avg_loss));
            } else {
                avg_gain = (avg_gain * (n - 1.0) + gain) / n;
                avg_loss = (avg_loss * (n - 1.0) + loss) / n;
                out[i] = Some(rsi_value(avg_gain, avg_loss));
            }
        }
        prev = Some(v);
    }

    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
    }
}
