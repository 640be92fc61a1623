//! MACD histogram.
//!
//! MACD Line = EMA(fast) - EMA(slow)
//! Signal Line = EMA(signal) of MACD Line
//! Histogram = MACD Line - Signal Line
//!
//! Default parameters: fast=12, slow=26, signal=9
//! Warmup: slow - 1 + signal - 1 values.

use crate::domain::indicator::calculate_ema;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

pub fn calculate_macd_histogram(
    values: &[Option<f64>],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> Vec<Option<f64>> {
    if fast == 0 || slow == 0 || signal_period == 0 {
        return vec![None; values.len()];
    }

    let ema_fast = calculate_ema(values, fast);
    let ema_slow = calculate_ema(values, slow);

    let macd_line: Vec<Option<f64>> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();

    // The signal EMA seeds on the first `signal_period` defined MACD values,
    // and reseeds whenever a gap interrupts the line.
    let signal_line = calculate_ema(&macd_line, signal_period);

    macd_line
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| Some((*m)? - (*s)?))
        .collect()
}
