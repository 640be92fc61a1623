//! Strategy tree data structures.
//!
//! A strategy is a root `FlowNode` plus a table of call chains that `call`
//! nodes reference by id. The tree is immutable once loaded; all per-run
//! state lives in the evaluator.
//!
//! Child slots hold ordered lists of optional nodes. A `null` entry is a
//! placeholder that contributes nothing. A missing or empty slot is
//! normalized to a single `null` on load.
//!
//! A node accepts only the keys of its kind; anything else is rejected on
//! load. Ladder slots may be written either as a `ladder` array or as
//! `ladder-0`, `ladder-1`, ... keys.

use crate::domain::condition::{Condition, IndicatorRef};
use crate::domain::indicator::Metric;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Position ticker that stands for holding cash.
pub const CASH_TICKER: &str = "Empty";

pub type Slot = Vec<Option<FlowNode>>;

fn placeholder_slot() -> Slot {
    vec![None]
}

fn normalize_slot(slot: Option<Slot>) -> Slot {
    match slot {
        Some(entries) if !entries.is_empty() => entries,
        _ => placeholder_slot(),
    }
}

fn deserialize_slot<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Slot, D::Error> {
    Option::<Slot>::deserialize(deserializer).map(normalize_slot)
}

fn deserialize_ladder<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Slot>, D::Error> {
    let slots = Vec::<Option<Slot>>::deserialize(deserializer)?;
    Ok(slots.into_iter().map(normalize_slot).collect())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Weighting {
    #[default]
    Equal,
    /// Shares scaled by 1/σ of daily returns over `window`.
    InverseVolatility { window: i64 },
    /// Shares scaled by σ of daily returns over `window`.
    Pro { window: i64 },
    Specified { weights: Vec<f64> },
    /// Equal shares, each ticker clipped at `cap`. The excess goes to
    /// `fallback`, or stays in cash without one.
    Capped {
        cap: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fallback: Option<String>,
    },
}

impl Weighting {
    /// Ticker the weighting may allocate to on its own.
    pub fn fallback_ticker(&self) -> Option<&str> {
        match self {
            Weighting::Capped {
                fallback: Some(ticker),
                ..
            } if ticker != CASH_TICKER => Some(ticker),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Selection {
    Top,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Quantifier {
    All,
    Any,
    #[serde(rename = "none")]
    NoneOf,
    AtLeast(usize),
    AtMost(usize),
    Exactly(usize),
    /// Route to `ladder[k]`, where k is the number of true items.
    Ladder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberedItem {
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct FlowNode {
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKind,
}

#[derive(Deserialize)]
struct RawNode {
    id: String,
    #[serde(flatten)]
    kind: NodeKind,
}

/// Keys each kind accepts besides `id` and `kind`.
fn allowed_keys(kind: &str) -> Option<&'static [&'static str]> {
    Some(match kind {
        "basic" => &["weighting", "next"],
        "function" => &["metric", "window", "count", "select", "weighting", "next"],
        "indicator" => &["conditions", "weightingThen", "weightingElse", "then", "else"],
        "numbered" => &[
            "items",
            "quantifier",
            "weightingThen",
            "weightingElse",
            "then",
            "else",
            "ladder",
        ],
        "position" => &["tickers"],
        "call" => &["callId"],
        "altExit" => &[
            "entry",
            "exit",
            "weightingThen",
            "weightingElse",
            "then",
            "else",
        ],
        "scaling" => &[
            "indicator",
            "scaleFrom",
            "scaleTo",
            "weightingThen",
            "weightingElse",
            "then",
            "else",
        ],
        _ => return None,
    })
}

/// Fold `ladder-N` keys into a single `ladder` array.
fn gather_ladder_keys(map: &mut Map<String, Value>) -> Result<(), String> {
    let keys: Vec<String> = map
        .keys()
        .filter(|k| k.starts_with("ladder-"))
        .cloned()
        .collect();
    if keys.is_empty() {
        return Ok(());
    }
    if map.contains_key("ladder") {
        return Err("both `ladder` and `ladder-N` slots given".to_string());
    }

    let mut slots = Vec::new();
    for key in keys {
        let index: usize = key
            .strip_prefix("ladder-")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| format!("bad ladder slot name `{key}`"))?;
        if slots.len() <= index {
            slots.resize(index + 1, Value::Null);
        }
        slots[index] = map.remove(&key).unwrap_or(Value::Null);
    }
    map.insert("ladder".to_string(), Value::Array(slots));
    Ok(())
}

impl TryFrom<Map<String, Value>> for FlowNode {
    type Error = String;

    fn try_from(mut map: Map<String, Value>) -> Result<Self, Self::Error> {
        let kind = map
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if kind == "numbered" {
            gather_ladder_keys(&mut map)?;
        }

        // Unknown kinds fall through to the tagged-enum error below.
        if let Some(allowed) = allowed_keys(&kind) {
            let unknown = map
                .keys()
                .find(|k| !matches!(k.as_str(), "id" | "kind") && !allowed.contains(&k.as_str()));
            if let Some(key) = unknown {
                let id = map.get("id").and_then(Value::as_str).unwrap_or("?");
                return Err(format!("unknown field `{key}` on {kind} node {id}"));
            }
        }

        let raw: RawNode = serde_json::from_value(Value::Object(map)).map_err(|e| e.to_string())?;
        Ok(FlowNode {
            id: raw.id,
            kind: raw.kind,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum NodeKind {
    Basic {
        #[serde(default)]
        weighting: Weighting,
        #[serde(default = "placeholder_slot", deserialize_with = "deserialize_slot")]
        next: Slot,
    },
    Function {
        metric: Metric,
        #[serde(default)]
        window: i64,
        count: usize,
        select: Selection,
        #[serde(default)]
        weighting: Weighting,
        #[serde(default = "placeholder_slot", deserialize_with = "deserialize_slot")]
        next: Slot,
    },
    Indicator {
        conditions: Vec<Condition>,
        #[serde(default)]
        weighting_then: Weighting,
        #[serde(default)]
        weighting_else: Weighting,
        #[serde(default = "placeholder_slot", deserialize_with = "deserialize_slot")]
        then: Slot,
        #[serde(
            rename = "else",
            default = "placeholder_slot",
            deserialize_with = "deserialize_slot"
        )]
        otherwise: Slot,
    },
    Numbered {
        items: Vec<NumberedItem>,
        quantifier: Quantifier,
        #[serde(default)]
        weighting_then: Weighting,
        #[serde(default)]
        weighting_else: Weighting,
        #[serde(default = "placeholder_slot", deserialize_with = "deserialize_slot")]
        then: Slot,
        #[serde(
            rename = "else",
            default = "placeholder_slot",
            deserialize_with = "deserialize_slot"
        )]
        otherwise: Slot,
        /// One slot per possible count of true items, 0 through
        /// `items.len()`. Only used by the ladder quantifier, whose slots
        /// take `weightingThen`.
        #[serde(
            default,
            skip_serializing_if = "Vec::is_empty",
            deserialize_with = "deserialize_ladder"
        )]
        ladder: Vec<Slot>,
    },
    Position {
        tickers: Vec<String>,
    },
    Call {
        call_id: String,
    },
    AltExit {
        entry: Vec<Condition>,
        exit: Vec<Condition>,
        #[serde(default)]
        weighting_then: Weighting,
        #[serde(default)]
        weighting_else: Weighting,
        #[serde(default = "placeholder_slot", deserialize_with = "deserialize_slot")]
        then: Slot,
        #[serde(
            rename = "else",
            default = "placeholder_slot",
            deserialize_with = "deserialize_slot"
        )]
        otherwise: Slot,
    },
    Scaling {
        indicator: IndicatorRef,
        scale_from: f64,
        scale_to: f64,
        #[serde(default)]
        weighting_then: Weighting,
        #[serde(default)]
        weighting_else: Weighting,
        #[serde(default = "placeholder_slot", deserialize_with = "deserialize_slot")]
        then: Slot,
        #[serde(
            rename = "else",
            default = "placeholder_slot",
            deserialize_with = "deserialize_slot"
        )]
        otherwise: Slot,
    },
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Basic { .. } => "basic",
            NodeKind::Function { .. } => "function",
            NodeKind::Indicator { .. } => "indicator",
            NodeKind::Numbered { .. } => "numbered",
            NodeKind::Position { .. } => "position",
            NodeKind::Call { .. } => "call",
            NodeKind::AltExit { .. } => "altExit",
            NodeKind::Scaling { .. } => "scaling",
        }
    }
}

impl FlowNode {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    pub fn basic(id: impl Into<String>, next: Vec<FlowNode>) -> Self {
        Self::new(
            id,
            NodeKind::Basic {
                weighting: Weighting::Equal,
                next: into_slot(next),
            },
        )
    }

    pub fn position(id: impl Into<String>, tickers: &[&str]) -> Self {
        Self::new(
            id,
            NodeKind::Position {
                tickers: tickers.iter().map(|t| t.to_string()).collect(),
            },
        )
    }

    pub fn call(id: impl Into<String>, call_id: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeKind::Call {
                call_id: call_id.into(),
            },
        )
    }

    /// Every child slot in declaration order.
    pub fn slots(&self) -> Vec<&Slot> {
        match &self.kind {
            NodeKind::Basic { next, .. } | NodeKind::Function { next, .. } => vec![next],
            NodeKind::Numbered {
                then,
                otherwise,
                ladder,
                ..
            } => {
                let mut slots = vec![then, otherwise];
                slots.extend(ladder);
                slots
            }
            NodeKind::Indicator {
                then, otherwise, ..
            }
            | NodeKind::AltExit {
                then, otherwise, ..
            }
            | NodeKind::Scaling {
                then, otherwise, ..
            } => vec![then, otherwise],
            NodeKind::Position { .. } | NodeKind::Call { .. } => Vec::new(),
        }
    }

    /// Weighting modes of this node's slots.
    pub fn weightings(&self) -> Vec<&Weighting> {
        match &self.kind {
            NodeKind::Basic { weighting, .. } | NodeKind::Function { weighting, .. } => {
                vec![weighting]
            }
            NodeKind::Indicator {
                weighting_then,
                weighting_else,
                ..
            }
            | NodeKind::Numbered {
                weighting_then,
                weighting_else,
                ..
            }
            | NodeKind::AltExit {
                weighting_then,
                weighting_else,
                ..
            }
            | NodeKind::Scaling {
                weighting_then,
                weighting_else,
                ..
            } => vec![weighting_then, weighting_else],
            NodeKind::Position { .. } | NodeKind::Call { .. } => Vec::new(),
        }
    }

    /// Direct children, skipping placeholders.
    pub fn children(&self) -> impl Iterator<Item = &FlowNode> {
        self.slots()
            .into_iter()
            .flat_map(|slot| slot.iter().flatten())
    }

    /// Depth-first walk over this node and its descendants. Does not follow
    /// `call` references.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a FlowNode)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }
}

/// Wrap nodes as a slot; no nodes gives the placeholder slot.
pub fn into_slot(nodes: Vec<FlowNode>) -> Slot {
    if nodes.is_empty() {
        placeholder_slot()
    } else {
        nodes.into_iter().map(Some).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub root: FlowNode,
    #[serde(default)]
    pub chains: BTreeMap<String, FlowNode>,
}

impl Strategy {
    pub fn new(name: impl Into<String>, root: FlowNode) -> Self {
        Self {
            name: name.into(),
            description: None,
            root,
            chains: BTreeMap::new(),
        }
    }

    pub fn with_chain(mut self, id: impl Into<String>, root: FlowNode) -> Self {
        self.chains.insert(id.into(), root);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::condition::{Comparator, ConditionKind, Rhs};

    #[test]
    fn missing_slots_normalize_to_placeholder() {
        let json = r#"{"id": "n1", "kind": "basic"}"#;
        let node: FlowNode = serde_json::from_str(json).unwrap();
        match node.kind {
            NodeKind::Basic { weighting, next } => {
                assert_eq!(weighting, Weighting::Equal);
                assert_eq!(next, vec![None]);
            }
            other => panic!("unexpected kind {}", other.name()),
        }
    }

    #[test]
    fn empty_and_null_slots_normalize() {
        let json = r#"{"id": "n1", "kind": "indicator", "conditions": [], "then": [], "else": null}"#;
        let node: FlowNode = serde_json::from_str(json).unwrap();
        assert_eq!(node.slots(), vec![&vec![None], &vec![None]]);
        assert_eq!(node.children().count(), 0);
    }

    #[test]
    fn parses_nested_tree() {
        let json = r#"{
            "id": "root",
            "kind": "indicator",
            "conditions": [
                {"type": "if", "metric": "rsi", "window": 14, "ticker": "SPY", "comparator": "<", "rhs": 30}
            ],
            "weightingThen": {"inverseVolatility": {"window": 20}},
            "then": [{"id": "p1", "kind": "position", "tickers": ["SPY", "QQQ"]}],
            "else": [null, {"id": "c1", "kind": "call", "callId": "hedge"}]
        }"#;
        let node: FlowNode = serde_json::from_str(json).unwrap();
        let NodeKind::Indicator {
            conditions,
            weighting_then,
            weighting_else,
            then,
            otherwise,
        } = &node.kind
        else {
            panic!("expected indicator");
        };
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].kind, ConditionKind::If);
        assert_eq!(conditions[0].comparator, Comparator::Lt);
        assert_eq!(conditions[0].rhs, Rhs::Threshold(30.0));
        assert_eq!(*weighting_then, Weighting::InverseVolatility { window: 20 });
        assert_eq!(*weighting_else, Weighting::Equal);
        assert_eq!(then.len(), 1);
        assert_eq!(otherwise.len(), 2);
        assert!(otherwise[0].is_none());
        assert_eq!(otherwise[1], Some(FlowNode::call("c1", "hedge")));
    }

    #[test]
    fn parses_quantifiers_and_scaling() {
        let json = r#"{
            "id": "n",
            "kind": "numbered",
            "items": [],
            "quantifier": {"atLeast": 2}
        }"#;
        let node: FlowNode = serde_json::from_str(json).unwrap();
        assert!(matches!(
            node.kind,
            NodeKind::Numbered {
                quantifier: Quantifier::AtLeast(2),
                ..
            }
        ));

        let json = r#"{
            "id": "s",
            "kind": "scaling",
            "indicator": {"metric": "rsi", "window": 14, "ticker": "SPY"},
            "scaleFrom": 30,
            "scaleTo": 70
        }"#;
        let node: FlowNode = serde_json::from_str(json).unwrap();
        let NodeKind::Scaling {
            scale_from,
            scale_to,
            ..
        } = node.kind
        else {
            panic!("expected scaling");
        };
        assert_eq!((scale_from, scale_to), (30.0, 70.0));
    }

    #[test]
    fn unknown_kind_fails() {
        let json = r#"{"id": "n", "kind": "loop"}"#;
        assert!(serde_json::from_str::<FlowNode>(json).is_err());
    }

    #[test]
    fn unknown_key_rejected() {
        let json = r#"{"id": "n", "kind": "basic", "nxet": []}"#;
        let err = serde_json::from_str::<FlowNode>(json).unwrap_err();
        assert!(err.to_string().contains("unknown field `nxet` on basic node n"));

        // `ladder` belongs to numbered nodes only
        let json = r#"{"id": "p", "kind": "position", "tickers": ["SPY"], "ladder": []}"#;
        assert!(serde_json::from_str::<FlowNode>(json).is_err());
    }

    #[test]
    fn ladder_keys_fold_into_slots() {
        let json = r#"{
            "id": "n",
            "kind": "numbered",
            "items": [],
            "quantifier": "ladder",
            "ladder-2": [{"id": "p2", "kind": "position", "tickers": ["QQQ"]}],
            "ladder-0": [{"id": "p0", "kind": "position", "tickers": ["Empty"]}]
        }"#;
        let node: FlowNode = serde_json::from_str(json).unwrap();
        let NodeKind::Numbered { ladder, .. } = &node.kind else {
            panic!("expected numbered");
        };
        assert_eq!(ladder.len(), 3);
        assert_eq!(ladder[0], vec![Some(FlowNode::position("p0", &[CASH_TICKER]))]);
        assert_eq!(ladder[1], vec![None]);
        assert_eq!(ladder[2], vec![Some(FlowNode::position("p2", &["QQQ"]))]);
        assert_eq!(node.children().count(), 2);
    }

    #[test]
    fn ladder_key_forms_conflict() {
        let json = r#"{
            "id": "n", "kind": "numbered", "items": [], "quantifier": "ladder",
            "ladder": [], "ladder-0": []
        }"#;
        assert!(serde_json::from_str::<FlowNode>(json).is_err());
        let json = r#"{"id": "n", "kind": "numbered", "items": [], "quantifier": "ladder", "ladder-x": []}"#;
        let err = serde_json::from_str::<FlowNode>(json).unwrap_err();
        assert!(err.to_string().contains("bad ladder slot name"));
    }

    #[test]
    fn parses_none_and_at_most() {
        assert_eq!(
            serde_json::from_str::<Quantifier>(r#""none""#).unwrap(),
            Quantifier::NoneOf
        );
        assert_eq!(
            serde_json::from_str::<Quantifier>(r#"{"atMost": 1}"#).unwrap(),
            Quantifier::AtMost(1)
        );
    }

    #[test]
    fn parses_pro_and_capped_weightings() {
        assert_eq!(
            serde_json::from_str::<Weighting>(r#"{"pro": {"window": 10}}"#).unwrap(),
            Weighting::Pro { window: 10 }
        );
        let capped: Weighting =
            serde_json::from_str(r#"{"capped": {"cap": 0.25, "fallback": "SHY"}}"#).unwrap();
        assert_eq!(capped.fallback_ticker(), Some("SHY"));
        let bare: Weighting = serde_json::from_str(r#"{"capped": {"cap": 0.25}}"#).unwrap();
        assert_eq!(
            bare,
            Weighting::Capped {
                cap: 0.25,
                fallback: None
            }
        );
        assert_eq!(bare.fallback_ticker(), None);
    }

    #[test]
    fn walk_visits_depth_first() {
        let root = FlowNode::basic(
            "root",
            vec![
                FlowNode::basic("a", vec![FlowNode::position("a1", &["SPY"])]),
                FlowNode::position("b", &["QQQ"]),
            ],
        );
        let mut ids = Vec::new();
        root.walk(&mut |n| ids.push(n.id.as_str()));
        assert_eq!(ids, vec!["root", "a", "a1", "b"]);
    }

    #[test]
    fn strategy_document() {
        let json = r#"{
            "name": "demo",
            "root": {"id": "r", "kind": "call", "callId": "core"},
            "chains": {"core": {"id": "p", "kind": "position", "tickers": ["Empty"]}}
        }"#;
        let strategy: Strategy = serde_json::from_str(json).unwrap();
        assert_eq!(strategy.name, "demo");
        assert!(strategy.description.is_none());
        assert_eq!(strategy.chains["core"], FlowNode::position("p", &[CASH_TICKER]));
    }
}
