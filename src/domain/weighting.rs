//! Allocation arithmetic and slot weighting.
//!
//! An `Allocation` maps tickers to weights in [0, 1]. Whatever is not
//! allocated is cash, so the weights of one allocation sum to at most 1.

use crate::domain::flow::{CASH_TICKER, Weighting};
use std::collections::BTreeMap;

pub type Allocation = BTreeMap<String, f64>;

pub fn total_weight(allocation: &Allocation) -> f64 {
    allocation.values().sum()
}

/// Add `factor` × `source` into `target`, skipping zero contributions.
pub fn add_scaled(target: &mut Allocation, source: &Allocation, factor: f64) {
    for (ticker, weight) in source {
        let w = weight * factor;
        if w > 0.0 {
            *target.entry(ticker.clone()).or_insert(0.0) += w;
        }
    }
}

/// Mix weighted parts. `None` parts are pruned branches whose share stays
/// in cash; if every part is pruned the result is pruned too.
pub fn blend(parts: &[(f64, Option<Allocation>)]) -> Option<Allocation> {
    if parts.iter().all(|(_, a)| a.is_none()) {
        return None;
    }
    let mut out = Allocation::new();
    for (factor, allocation) in parts {
        if let Some(allocation) = allocation {
            add_scaled(&mut out, allocation, *factor);
        }
    }
    Some(out)
}

/// Combine the non-pruned children of one slot.
///
/// `children` pairs each child's slot index with its allocation. `volatility`
/// is consulted only by the volatility-scaled modes.
pub fn combine_slot(
    weighting: &Weighting,
    children: Vec<(usize, Allocation)>,
    volatility: &mut dyn FnMut(&str) -> Option<f64>,
) -> Option<Allocation> {
    if children.is_empty() {
        return None;
    }

    let shares = child_shares(weighting, &children);
    let mut out = Allocation::new();
    for ((_, allocation), share) in children.iter().zip(shares) {
        add_scaled(&mut out, allocation, share);
    }

    Some(match weighting {
        Weighting::InverseVolatility { .. } => scale_by_volatility(out, volatility, f64::recip),
        Weighting::Pro { .. } => scale_by_volatility(out, volatility, |sigma| sigma),
        Weighting::Capped { cap, fallback } => capped(out, *cap, fallback.as_deref()),
        Weighting::Equal | Weighting::Specified { .. } => out,
    })
}

fn child_shares(weighting: &Weighting, children: &[(usize, Allocation)]) -> Vec<f64> {
    let equal = vec![1.0 / children.len() as f64; children.len()];
    let Weighting::Specified { weights } = weighting else {
        return equal;
    };

    let raw: Vec<f64> = children
        .iter()
        .map(|(idx, _)| weights.get(*idx).copied().unwrap_or(0.0).max(0.0))
        .collect();
    let sum: f64 = raw.iter().sum();
    if sum > 0.0 {
        raw.into_iter().map(|w| w / sum).collect()
    } else {
        equal
    }
}

/// Rescale each ticker by `factor(σ)` and renormalize to the same invested
/// total. Falls back to the input when any ticker's σ is undefined or zero.
pub fn scale_by_volatility(
    allocation: Allocation,
    volatility: &mut dyn FnMut(&str) -> Option<f64>,
    factor: fn(f64) -> f64,
) -> Allocation {
    let invested = total_weight(&allocation);
    if invested <= 0.0 {
        return allocation;
    }

    let mut scaled = Allocation::new();
    let mut missing = None;
    for (ticker, weight) in &allocation {
        match volatility(ticker) {
            Some(sigma) if sigma > 0.0 => {
                scaled.insert(ticker.clone(), weight * factor(sigma));
            }
            _ => {
                missing = Some(ticker.clone());
                break;
            }
        }
    }
    if let Some(ticker) = missing {
        tracing::debug!(%ticker, "volatility undefined, keeping equal shares");
        return allocation;
    }

    let sum = total_weight(&scaled);
    for weight in scaled.values_mut() {
        *weight *= invested / sum;
    }
    scaled
}

/// Clip every ticker at `cap` and move the excess to `fallback`, which is
/// itself never clipped. Without a fallback (or with `Empty`) the excess is
/// cash.
pub fn capped(allocation: Allocation, cap: f64, fallback: Option<&str>) -> Allocation {
    let fallback = fallback.filter(|t| *t != CASH_TICKER);
    let mut out = Allocation::new();
    let mut excess = 0.0;
    for (ticker, weight) in allocation {
        if weight > cap && Some(ticker.as_str()) != fallback {
            excess += weight - cap;
            out.insert(ticker, cap);
        } else {
            out.insert(ticker, weight);
        }
    }
    if let Some(ticker) = fallback.filter(|_| excess > 0.0) {
        *out.entry(ticker.to_string()).or_insert(0.0) += excess;
    }
    out
}
