//! Strategy tree validation.
//!
//! Validates the whole document, root and every call chain, before any date
//! loop starts, and collects the anchor tickers that define the simulation
//! domain.

use crate::domain::condition::{Condition, ConditionKind, Rhs};
use crate::domain::error::FlowError;
use crate::domain::flow::{CASH_TICKER, FlowNode, NodeKind, Quantifier, Strategy, Weighting};
use crate::domain::indicator::{IndicatorType, Metric};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Validate `strategy` and return its anchor tickers.
pub fn validate_strategy(strategy: &Strategy) -> Result<BTreeSet<String>, FlowError> {
    let mut seen_ids = HashSet::new();
    let mut result = Ok(());
    let mut check = |node: &FlowNode| {
        if result.is_err() {
            return;
        }
        if !seen_ids.insert(node.id.clone()) {
            result = Err(invalid(node, "duplicate node id"));
            return;
        }
        result = validate_node(strategy, node);
    };

    strategy.root.walk(&mut check);
    for chain in strategy.chains.values() {
        chain.walk(&mut check);
    }
    result?;

    check_call_graph(strategy)?;
    Ok(anchor_tickers(strategy))
}

fn invalid(node: &FlowNode, reason: impl Into<String>) -> FlowError {
    FlowError::TreeInvalid {
        node_id: node.id.clone(),
        reason: reason.into(),
    }
}

fn validate_node(strategy: &Strategy, node: &FlowNode) -> Result<(), FlowError> {
    match &node.kind {
        NodeKind::Basic { weighting, .. } => validate_weighting(node, weighting),
        NodeKind::Function {
            metric,
            window,
            count,
            weighting,
            ..
        } => {
            IndicatorType::new(*metric, *window)?;
            if *count == 0 {
                return Err(invalid(node, "function count must be at least 1"));
            }
            validate_weighting(node, weighting)
        }
        NodeKind::Indicator {
            conditions,
            weighting_then,
            weighting_else,
            ..
        } => {
            validate_conditions(node, conditions)?;
            validate_weighting(node, weighting_then)?;
            validate_weighting(node, weighting_else)
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
            if items.is_empty() {
                return Err(invalid(node, "numbered node needs at least one item"));
            }
            for item in items {
                validate_conditions(node, &item.conditions)?;
            }
            if let Quantifier::AtLeast(n) | Quantifier::AtMost(n) | Quantifier::Exactly(n) =
                quantifier
            {
                if *n > items.len() {
                    return Err(invalid(
                        node,
                        format!("quantifier needs {} of {} items", n, items.len()),
                    ));
                }
            }
            if *quantifier == Quantifier::Ladder {
                if ladder.len() != items.len() + 1 {
                    return Err(invalid(
                        node,
                        format!(
                            "ladder needs {} slots for {} items, found {}",
                            items.len() + 1,
                            items.len(),
                            ladder.len()
                        ),
                    ));
                }
                if then.iter().chain(otherwise).any(Option::is_some) {
                    return Err(invalid(node, "ladder node routes through ladder slots only"));
                }
            } else if !ladder.is_empty() {
                return Err(invalid(node, "ladder slots need the ladder quantifier"));
            }
            validate_weighting(node, weighting_then)?;
            validate_weighting(node, weighting_else)
        }
        NodeKind::Position { tickers } => {
            if tickers.is_empty() {
                return Err(invalid(node, "position lists no tickers"));
            }
            if tickers.iter().any(|t| t.trim().is_empty()) {
                return Err(invalid(node, "position has a blank ticker"));
            }
            Ok(())
        }
        NodeKind::Call { call_id } => {
            if strategy.chains.contains_key(call_id) {
                Ok(())
            } else {
                Err(FlowError::DanglingCall {
                    node_id: node.id.clone(),
                    chain_id: call_id.clone(),
                })
            }
        }
        NodeKind::AltExit {
            entry,
            exit,
            weighting_then,
            weighting_else,
            ..
        } => {
            validate_conditions(node, entry)?;
            validate_conditions(node, exit)?;
            validate_weighting(node, weighting_then)?;
            validate_weighting(node, weighting_else)
        }
        NodeKind::Scaling {
            indicator,
            scale_from,
            scale_to,
            weighting_then,
            weighting_else,
            ..
        } => {
            indicator.indicator_type()?;
            if !scale_from.is_finite() || !scale_to.is_finite() {
                return Err(invalid(node, "scale bounds must be finite"));
            }
            if scale_from == scale_to {
                return Err(invalid(node, "scaleFrom and scaleTo must differ"));
            }
            validate_weighting(node, weighting_then)?;
            validate_weighting(node, weighting_else)
        }
    }
}

fn validate_conditions(node: &FlowNode, conditions: &[Condition]) -> Result<(), FlowError> {
    if let Some(first) = conditions.first() {
        if first.kind != ConditionKind::If {
            return Err(invalid(node, "first condition must be of type 'if'"));
        }
    }
    for condition in conditions {
        condition.lhs.indicator_type()?;
        match &condition.rhs {
            Rhs::Indicator(r) => {
                r.indicator_type()?;
            }
            Rhs::Threshold(t) if !t.is_finite() => {
                return Err(invalid(node, "condition threshold must be finite"));
            }
            Rhs::Threshold(_) => {}
        }
        if condition.sustained_days == Some(0) {
            return Err(invalid(node, "sustainedDays must be at least 1"));
        }
    }
    Ok(())
}

fn validate_weighting(node: &FlowNode, weighting: &Weighting) -> Result<(), FlowError> {
    match weighting {
        Weighting::Equal => Ok(()),
        Weighting::InverseVolatility { window } | Weighting::Pro { window } => {
            IndicatorType::new(Metric::StdDevReturn, *window).map(|_| ())
        }
        Weighting::Capped { cap, fallback } => {
            if !cap.is_finite() || *cap <= 0.0 || *cap > 1.0 {
                return Err(invalid(node, "cap must be in (0, 1]"));
            }
            if fallback.as_deref().is_some_and(|t| t.trim().is_empty()) {
                return Err(invalid(node, "capped fallback is blank"));
            }
            Ok(())
        }
        Weighting::Specified { weights } => {
            if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
                return Err(invalid(node, "specified weights must be non-negative"));
            }
            Ok(())
        }
    }
}

/// Chain ids called directly from `node`'s subtree.
fn direct_calls(node: &FlowNode) -> Vec<&str> {
    let mut calls = Vec::new();
    node.walk(&mut |n| {
        if let NodeKind::Call { call_id } = &n.kind {
            calls.push(call_id.as_str());
        }
    });
    calls
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

/// Reject any cycle in the static chain-to-chain call graph.
fn check_call_graph(strategy: &Strategy) -> Result<(), FlowError> {
    let graph: HashMap<&str, Vec<&str>> = strategy
        .chains
        .iter()
        .map(|(id, root)| (id.as_str(), direct_calls(root)))
        .collect();

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut path: Vec<&str> = Vec::new();
    for id in strategy.chains.keys() {
        visit_chain(id, &graph, &mut marks, &mut path)?;
    }
    Ok(())
}

fn visit_chain<'s>(
    id: &'s str,
    graph: &HashMap<&'s str, Vec<&'s str>>,
    marks: &mut HashMap<&'s str, Mark>,
    path: &mut Vec<&'s str>,
) -> Result<(), FlowError> {
    match marks.get(id) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            return Err(FlowError::CallCycle {
                chain_id: id.to_string(),
                path: path.join(" -> "),
            });
        }
        None => {}
    }

    marks.insert(id, Mark::Visiting);
    path.push(id);
    for next in graph.get(id).into_iter().flatten().copied() {
        visit_chain(next, graph, marks, path)?;
    }
    path.pop();
    marks.insert(id, Mark::Done);
    Ok(())
}

/// Tickers referenced by positions, conditions, scaling nodes and capped
/// fallbacks reachable from the root, following calls.
pub fn anchor_tickers(strategy: &Strategy) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let mut visited = HashSet::new();
    collect_tickers(strategy, &strategy.root, &mut out, &mut visited);
    out
}

fn collect_tickers<'s>(
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
                    collect_tickers(strategy, chain, out, visited_chains);
                }
            }
            return;
        }
        NodeKind::Indicator { conditions, .. } => add_condition_tickers(conditions, out),
        NodeKind::Numbered { items, .. } => {
            for item in items {
                add_condition_tickers(&item.conditions, out);
            }
        }
        NodeKind::AltExit { entry, exit, .. } => {
            add_condition_tickers(entry, out);
            add_condition_tickers(exit, out);
        }
        NodeKind::Scaling { indicator, .. } => {
            out.insert(indicator.ticker.clone());
        }
        NodeKind::Basic { .. } | NodeKind::Function { .. } => {}
    }
    for weighting in node.weightings() {
        out.extend(weighting.fallback_ticker().map(str::to_string));
    }

    for child in node.children() {
        collect_tickers(strategy, child, out, visited_chains);
    }
}

fn add_condition_tickers(conditions: &[Condition], out: &mut BTreeSet<String>) {
    for condition in conditions {
        out.extend(condition.tickers().map(str::to_string));
    }
}
