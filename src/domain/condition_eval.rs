//! Condition evaluation engine.
//!
//! Conditions evaluate to a tri-state series aligned to the price matrix
//! domain: `Some(true)`, `Some(false)`, or `None` where an input is undefined.
//!
//! # Evaluation Semantics
//!
//! - Plain comparators compare LHS and RHS on the same day.
//! - `crossesAbove`/`crossesBelow`: today's strict relation holds and the
//!   previous day's did not. Undefined on day 0 or when either day is
//!   undefined.
//! - `sustainedDays(N)`: true only if the base comparison held on each of the
//!   trailing N days; undefined if any of them is undefined.
//! - Lists fold left to right with no precedence: the first entry seeds, each
//!   later entry ANDs or ORs into the running result by its own tag.
//!   Three-valued: `false AND ?` is false, `true OR ?` is true, otherwise an
//!   undefined operand makes the result undefined.

use crate::domain::condition::{Condition, ConditionKind, Rhs};
use crate::domain::error::FlowError;
use crate::domain::indicator_cache::IndicatorCache;

pub type TriState = Option<bool>;

pub fn evaluate_condition(
    condition: &Condition,
    cache: &mut IndicatorCache<'_>,
) -> Result<Vec<TriState>, FlowError> {
    let len = cache.matrix().len();
    let lhs_type = condition.lhs.indicator_type()?;
    let left = cache.series(&condition.lhs.ticker, lhs_type).values.clone();
    let right: Vec<Option<f64>> = match &condition.rhs {
        Rhs::Threshold(t) => vec![Some(*t); len],
        Rhs::Indicator(r) => {
            let rhs_type = r.indicator_type()?;
            cache.series(&r.ticker, rhs_type).values.clone()
        }
    };

    let comparator = condition.comparator;
    let relation: Vec<TriState> = left
        .iter()
        .zip(&right)
        .map(|(l, r)| Some(comparator.holds((*l)?, (*r)?)))
        .collect();

    let base = if comparator.is_crossing() {
        (0..len)
            .map(|i| {
                if i == 0 {
                    return None;
                }
                let today = relation[i]?;
                let yesterday = relation[i - 1]?;
                Some(today && !yesterday)
            })
            .collect()
    } else {
        relation
    };

    Ok(match condition.sustained_days {
        Some(days) if days > 1 => sustain(&base, days as usize),
        _ => base,
    })
}

/// True at `i` only when the trailing `days` values are all true.
fn sustain(base: &[TriState], days: usize) -> Vec<TriState> {
    let mut out = vec![None; base.len()];
    let mut falses = 0usize;
    let mut undefined = 0usize;

    for i in 0..base.len() {
        match base[i] {
            Some(false) => falses += 1,
            None => undefined += 1,
            Some(true) => {}
        }
        if i >= days {
            match base[i - days] {
                Some(false) => falses -= 1,
                None => undefined -= 1,
                Some(true) => {}
            }
        }
        if i + 1 >= days {
            out[i] = if undefined > 0 {
                None
            } else {
                Some(falses == 0)
            };
        }
    }
    out
}

fn combine(kind: ConditionKind, acc: TriState, next: TriState) -> TriState {
    match kind {
        ConditionKind::If => next,
        ConditionKind::And => match (acc, next) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        ConditionKind::Or => match (acc, next) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
    }
}

/// Fold a condition list into one series. An empty list holds on every
/// day, so the node always takes `then`.
pub fn evaluate_conditions(
    conditions: &[Condition],
    cache: &mut IndicatorCache<'_>,
) -> Result<Vec<TriState>, FlowError> {
    let len = cache.matrix().len();
    if conditions.is_empty() {
        return Ok(vec![Some(true); len]);
    }
    let mut acc: Vec<TriState> = vec![None; len];

    for (idx, condition) in conditions.iter().enumerate() {
        let series = evaluate_condition(condition, cache)?;
        // The first entry always seeds, whatever its tag.
        let kind = if idx == 0 {
            ConditionKind::If
        } else {
            condition.kind
        };
        for (a, s) in acc.iter_mut().zip(series) {
            *a = combine(kind, *a, s);
        }
    }

    Ok(acc)
}
