//! Average True Range (Wilder smoothing).
//!
//! TR = max(high - low, |high - prev_close|, |low - prev_close|); the first
//! bar of a run has no previous close and uses high - low.
//! ATR seeds with the mean of the first n TRs, then
//! ATR[i] = (ATR[i-1] * (n-1) + TR[i]) / n.
//! Warmup: first (n-1) bars are invalid.

use crate::domain::indicator::finite;

/// True range per bar; `None` where the bar is incomplete.
pub(crate) fn true_ranges(
    high: &[Option<f64>],
    low: &[Option<f64>],
    close: &[Option<f64>],
) -> Vec<Option<f64>> {
    let mut prev_close: Option<f64> = None;
    (0..close.len())
        .map(|i| {
            let bar = (
                finite(high[i]),
                finite(low[i]),
                finite(close[i]),
            );
            let (Some(h), Some(l), Some(c)) = bar else {
                prev_close = None;
                return None;
            };
            let tr = match prev_close {
                Some(pc) => (h - l).max((h - pc).abs()).max((l - pc).abs()),
                None => h - l,
            };
            prev_close = Some(c);
            Some(tr)
        })
        .collect()
}

pub fn calculate_atr(
    high: &[Option<f64>],
    low: &[Option<f64>],
    close: &[Option<f64>],
    period: usize,
) -> Vec<Option<f64>> {
    let mut out = vec![None; close.len()];
    if period == 0 {
        return out;
    }

    let n = period as f64;
    let mut run = 0usize;
    let mut sum = 0.0;
    let mut atr = 0.0;

    for (i, tr) in true_ranges(high, low, close).into_iter().enumerate() {
        let Some(tr) = tr else {
            run = 0;
            sum = 0.0;
            continue;
        };

        run += 1;
        if run < period {
            sum += tr;
        } else if run == period {
            sum += tr;
            atr = sum / n;
            out[i] = Some(atr);
        } else {
            atr = (atr * (n - 1.0) + tr) / n;
            out[i] = Some(atr);
        }
    }

    out
}
