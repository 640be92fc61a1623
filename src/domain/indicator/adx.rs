//! Average Directional Index.
//!
//! +DM = up move when it beats the down move, -DM likewise. TR, +DM and -DM
//! are Wilder-smoothed as running sums, giving +DI/-DI and
//! DX = 100 × |+DI - -DI| / (+DI + -DI). ADX seeds with the mean of the
//! first n DX values and is then Wilder-smoothed.
//!
//! Warmup: the first DX needs n directional moves (index n), the first ADX
//! needs n DX values, so index 2n-1 is the first defined value.

use crate::domain::indicator::finite;

pub fn calculate_adx(
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
    let mut state = AdxState::default();

    for i in 0..close.len() {
        let (Some(h), Some(l), Some(c)) = (finite(high[i]), finite(low[i]), finite(close[i]))
        else {
            state = AdxState::default();
            continue;
        };

        if let Some((ph, pl, pc)) = state.prev {
            let up = h - ph;
            let down = pl - l;
            let plus_dm = if up > down && up > 0.0 { up } else { 0.0 };
            let minus_dm = if down > up && down > 0.0 { down } else { 0.0 };
            let tr = (h - l).max((h - pc).abs()).max((l - pc).abs());

            state.moves += 1;
            if state.moves <= period {
                state.tr += tr;
                state.plus += plus_dm;
                state.minus += minus_dm;
            } else {
                state.tr = state.tr - state.tr / n + tr;
                state.plus = state.plus - state.plus / n + plus_dm;
                state.minus = state.minus - state.minus / n + minus_dm;
            }

            if state.moves >= period {
                let dx = directional_index(state.tr, state.plus, state.minus);
                state.dx_count += 1;
                if state.dx_count < period {
                    state.dx_sum += dx;
                } else if state.dx_count == period {
                    state.dx_sum += dx;
                    state.adx = state.dx_sum / n;
                    out[i] = Some(state.adx);
                } else {
                    state.adx = (state.adx * (n - 1.0) + dx) / n;
                    out[i] = Some(state.adx);
                }
            }
        }
        state.prev = Some((h, l, c));
    }

    out
}

#[derive(Default)]
struct AdxState {
    prev: Option<(f64, f64, f64)>,
    moves: usize,
    tr: f64,
    plus: f64,
    minus: f64,
    dx_count: usize,
    dx_sum: f64,
    adx: f64,
}

fn directional_index(tr: f64, plus_dm: f64, minus_dm: f64) -> f64 {
    if tr <= 0.0 {
        return 0.0;
    }
    let plus_di = 100.0 * plus_dm / tr;
    let minus_di = 100.0 * minus_dm / tr;
    let total = plus_di + minus_di;
    if total == 0.0 {
        0.0
    } else {
        100.0 * (plus_di - minus_di).abs() / total
    }
}
