//! Strategy tree evaluator.
//!
//! `Evaluator` walks the tree once per day, in ascending date order, and
//! resolves each node into an allocation. `None` from a node means the
//! branch is pruned (a placeholder, an empty selection) and its parent
//! treats it as absent.
//!
//! The tree itself stays immutable. Everything that must survive between
//! days lives in the evaluator and is keyed by node id:
//! - condition series, memoized on first use
//! - altExit held/not-held flags
//! - function candidate lists
//!
//! The indicator cache is owned by the evaluator, so a fresh evaluator
//! starts from a clean slate.

use crate::domain::condition::Condition;
use crate::domain::condition_eval::{TriState, evaluate_conditions};
use crate::domain::error::FlowError;
use crate::domain::flow::{
    CASH_TICKER, FlowNode, NodeKind, Quantifier, Selection, Slot, Strategy, Weighting,
};
use crate::domain::indicator::{IndicatorType, Metric};
use crate::domain::indicator_cache::IndicatorCache;
use crate::domain::price_matrix::PriceMatrix;
use crate::domain::weighting::{Allocation, blend, combine_slot};
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, Copy, Default)]
struct AltExitState {
    held: bool,
    last_day: Option<usize>,
}

/// The two branches of a deciding node.
struct Fork<'a> {
    then: &'a Slot,
    otherwise: &'a Slot,
    weighting_then: &'a Weighting,
    weighting_else: &'a Weighting,
}

pub struct Evaluator<'a> {
    strategy: &'a Strategy,
    cache: IndicatorCache<'a>,
    conditions: HashMap<String, Vec<TriState>>,
    alt_exit: HashMap<String, AltExitState>,
    candidates: HashMap<String, Vec<String>>,
    call_stack: Vec<String>,
}

impl<'a> Evaluator<'a> {
    pub fn new(strategy: &'a Strategy, matrix: &'a PriceMatrix) -> Self {
        Self {
            strategy,
            cache: IndicatorCache::new(matrix),
            conditions: HashMap::new(),
            alt_exit: HashMap::new(),
            candidates: HashMap::new(),
            call_stack: Vec::new(),
        }
    }

    /// Root allocation for `day`. Days must be visited in ascending order.
    pub fn evaluate_day(&mut self, day: usize) -> Result<Allocation, FlowError> {
        self.call_stack.clear();
        let strategy = self.strategy;
        Ok(self.evaluate(&strategy.root, day, None)?.unwrap_or_default())
    }

    /// Whether an altExit node currently holds its `then` branch.
    pub fn is_held(&self, node_id: &str) -> bool {
        self.alt_exit.get(node_id).is_some_and(|s| s.held)
    }

    fn evaluate(
        &mut self,
        node: &'a FlowNode,
        day: usize,
        scope: Option<&BTreeSet<String>>,
    ) -> Result<Option<Allocation>, FlowError> {
        match &node.kind {
            NodeKind::Basic { weighting, next } => self.evaluate_slot(next, weighting, day, scope),
            NodeKind::Function {
                metric,
                window,
                count,
                select,
                weighting,
                next,
            } => {
                let indicator_type = IndicatorType::new(*metric, *window)?;
                let candidates = self.candidates_for(node);

                let mut ranked: Vec<(f64, String)> = Vec::new();
                for ticker in candidates {
                    if scope.is_some_and(|s| !s.contains(&ticker)) {
                        continue;
                    }
                    if let Some(value) = self.cache.value(&ticker, indicator_type, day) {
                        ranked.push((value, ticker));
                    }
                }
                ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

                let selected: BTreeSet<String> = match select {
                    Selection::Top => ranked.into_iter().rev().take(*count).map(|(_, t)| t).collect(),
                    Selection::Bottom => ranked.into_iter().take(*count).map(|(_, t)| t).collect(),
                };
                if selected.is_empty() {
                    return Ok(None);
                }
                self.evaluate_slot(next, weighting, day, Some(&selected))
            }
            NodeKind::Indicator {
                conditions,
                weighting_then,
                weighting_else,
                then,
                otherwise,
            } => {
                let signal = self.condition_at(&node.id, conditions, day)?;
                let share = if signal == Some(true) { 1.0 } else { 0.0 };
                let fork = Fork {
                    then,
                    otherwise,
                    weighting_then,
                    weighting_else,
                };
                self.mix(share, &fork, day, scope)
            }
            NodeKind::Numbered {
                items,
                quantifier,
                weighting_then,
                weighting_else,
                then,
                otherwise,
                ladder,
            } => {
                let mut hits = 0usize;
                for (idx, item) in items.iter().enumerate() {
                    let key = format!("{}#{}", node.id, idx);
                    if self.condition_at(&key, &item.conditions, day)? == Some(true) {
                        hits += 1;
                    }
                }
                if *quantifier == Quantifier::Ladder {
                    return match ladder.get(hits) {
                        Some(slot) => self.evaluate_slot(slot, weighting_then, day, scope),
                        None => Ok(None),
                    };
                }
                let passed = quantifier_passes(*quantifier, hits, items.len());
                let share = if passed { 1.0 } else { 0.0 };
                let fork = Fork {
                    then,
                    otherwise,
                    weighting_then,
                    weighting_else,
                };
                self.mix(share, &fork, day, scope)
            }
            NodeKind::Position { tickers } => Ok(position_allocation(tickers, scope)),
            NodeKind::Call { call_id } => {
                let strategy = self.strategy;
                let Some(chain) = strategy.chains.get(call_id) else {
                    return Err(FlowError::DanglingCall {
                        node_id: node.id.clone(),
                        chain_id: call_id.clone(),
                    });
                };
                if self.call_stack.contains(call_id) {
                    return Err(FlowError::CallCycle {
                        chain_id: call_id.clone(),
                        path: self.call_stack.join(" -> "),
                    });
                }

                self.call_stack.push(call_id.clone());
                let result = self.evaluate(chain, day, scope);
                self.call_stack.pop();
                result
            }
            NodeKind::AltExit {
                entry,
                exit,
                weighting_then,
                weighting_else,
                then,
                otherwise,
            } => {
                let held = self.step_alt_exit(node, entry, exit, day)?;
                let fork = Fork {
                    then,
                    otherwise,
                    weighting_then,
                    weighting_else,
                };
                self.mix(if held { 1.0 } else { 0.0 }, &fork, day, scope)
            }
            NodeKind::Scaling {
                indicator,
                scale_from,
                scale_to,
                weighting_then,
                weighting_else,
                then,
                otherwise,
            } => {
                if scale_from == scale_to {
                    return Err(FlowError::TreeInvalid {
                        node_id: node.id.clone(),
                        reason: "scaleFrom and scaleTo must differ".into(),
                    });
                }
                let indicator_type = indicator.indicator_type()?;
                // An undefined reading sends everything to `else`.
                let share = match self.cache.value(&indicator.ticker, indicator_type, day) {
                    Some(value) => {
                        1.0 - ((value - scale_from) / (scale_to - scale_from)).clamp(0.0, 1.0)
                    }
                    None => 0.0,
                };
                let fork = Fork {
                    then,
                    otherwise,
                    weighting_then,
                    weighting_else,
                };
                self.mix(share, &fork, day, scope)
            }
        }
    }

    fn evaluate_slot(
        &mut self,
        slot: &'a Slot,
        weighting: &Weighting,
        day: usize,
        scope: Option<&BTreeSet<String>>,
    ) -> Result<Option<Allocation>, FlowError> {
        let mut children = Vec::new();
        for (idx, entry) in slot.iter().enumerate() {
            let Some(child) = entry else { continue };
            if let Some(allocation) = self.evaluate(child, day, scope)? {
                children.push((idx, allocation));
            }
        }

        let volatility_type = match weighting {
            Weighting::InverseVolatility { window } | Weighting::Pro { window } => {
                Some(IndicatorType::new(Metric::StdDevReturn, *window)?)
            }
            _ => None,
        };
        let cache = &mut self.cache;
        let mut volatility =
            |ticker: &str| volatility_type.and_then(|t| cache.value(ticker, t, day));
        Ok(combine_slot(weighting, children, &mut volatility))
    }

    /// `share` of the allocation goes to `then`, the rest to `else`. Only
    /// branches with a non-zero share are evaluated.
    fn mix(
        &mut self,
        share: f64,
        fork: &Fork<'a>,
        day: usize,
        scope: Option<&BTreeSet<String>>,
    ) -> Result<Option<Allocation>, FlowError> {
        let mut parts = Vec::with_capacity(2);
        if share > 0.0 {
            let then = self.evaluate_slot(fork.then, fork.weighting_then, day, scope)?;
            parts.push((share, then));
        }
        if share < 1.0 {
            let otherwise = self.evaluate_slot(fork.otherwise, fork.weighting_else, day, scope)?;
            parts.push((1.0 - share, otherwise));
        }
        Ok(blend(&parts))
    }

    fn condition_at(
        &mut self,
        key: &str,
        conditions: &[Condition],
        day: usize,
    ) -> Result<TriState, FlowError> {
        if let Some(series) = self.conditions.get(key) {
            return Ok(series.get(day).copied().flatten());
        }
        let series = evaluate_conditions(conditions, &mut self.cache)?;
        let value = series.get(day).copied().flatten();
        self.conditions.insert(key.to_string(), series);
        Ok(value)
    }

    /// At most one transition per day: entry is only checked while not held,
    /// exit only while held.
    fn step_alt_exit(
        &mut self,
        node: &FlowNode,
        entry: &[Condition],
        exit: &[Condition],
        day: usize,
    ) -> Result<bool, FlowError> {
        let state = self.alt_exit.get(&node.id).copied().unwrap_or_default();
        if state.last_day == Some(day) {
            return Ok(state.held);
        }

        let held = if state.held {
            let key = format!("{}#exit", node.id);
            self.condition_at(&key, exit, day)? != Some(true)
        } else {
            let key = format!("{}#entry", node.id);
            self.condition_at(&key, entry, day)? == Some(true)
        };
        if held != state.held {
            tracing::debug!(node = %node.id, day, held, "altExit transition");
        }
        self.alt_exit.insert(
            node.id.clone(),
            AltExitState {
                held,
                last_day: Some(day),
            },
        );
        Ok(held)
    }

    fn candidates_for(&mut self, node: &FlowNode) -> Vec<String> {
        if let Some(found) = self.candidates.get(&node.id) {
            return found.clone();
        }
        let mut tickers = BTreeSet::new();
        let mut visited = HashSet::new();
        for child in node.children() {
            collect_position_tickers(self.strategy, child, &mut tickers, &mut visited);
        }
        let list: Vec<String> = tickers.into_iter().collect();
        self.candidates.insert(node.id.clone(), list.clone());
        list
    }
}

/// Tickers held by any position below `node`, following calls once each.
pub fn collect_position_tickers<'s>(
    strategy: &'s Strategy,
    node: &'s FlowNode,
    out: &mut BTreeSet<String>,
    visited_chains: &mut HashSet<&'s str>,
) {
    match &node.kind {
        NodeKind::Position { tickers } => {
            out.extend(tickers.iter().filter(|t| *t != CASH_TICKER).cloned());
        }
        NodeKind::Call { call_id } => {
            if let Some(chain) = strategy.chains.get(call_id) {
                if visited_chains.insert(call_id.as_str()) {
                    collect_position_tickers(strategy, chain, out, visited_chains);
                }
            }
        }
        _ => {
            for child in node.children() {
                collect_position_tickers(strategy, child, out, visited_chains);
            }
        }
    }
}

/// Equal share per listed ticker; `Empty` takes a share as cash. Tickers
/// outside `scope` are dropped, and nothing left prunes the position.
fn position_allocation(tickers: &[String], scope: Option<&BTreeSet<String>>) -> Option<Allocation> {
    let entries: Vec<&String> = tickers
        .iter()
        .filter(|t| *t == CASH_TICKER || scope.is_none_or(|s| s.contains(*t)))
        .collect();
    if entries.is_empty() {
        return None;
    }

    let share = 1.0 / entries.len() as f64;
    let mut out = Allocation::new();
    for ticker in entries.into_iter().filter(|t| *t != CASH_TICKER) {
        *out.entry(ticker.clone()).or_insert(0.0) += share;
    }
    Some(out)
}

/// Whether `hits` true items out of `total` send the node to `then`.
fn quantifier_passes(quantifier: Quantifier, hits: usize, total: usize) -> bool {
    match quantifier {
        Quantifier::All => total > 0 && hits == total,
        Quantifier::Any | Quantifier::Ladder => hits > 0,
        Quantifier::NoneOf => hits == 0,
        Quantifier::AtLeast(n) => hits >= n,
        Quantifier::AtMost(n) => hits <= n,
        Quantifier::Exactly(n) => hits == n,
    }
}
