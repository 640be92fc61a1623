//! JSON strategy document adapter implementing TreePort.

use crate::domain::error::FlowError;
use crate::domain::flow::Strategy;
use crate::ports::tree_port::TreePort;
use std::fs;
use std::path::Path;

#[derive(Debug, Default)]
pub struct JsonTreeAdapter;

impl JsonTreeAdapter {
    pub fn new() -> Self {
        Self
    }
}

/// Parse a strategy document. Unknown node kinds, node keys, metrics or comparators
/// surface as `TreeParse`.
pub fn parse_strategy(content: &str) -> Result<Strategy, FlowError> {
    serde_json::from_str(content).map_err(|e| FlowError::TreeParse {
        reason: e.to_string(),
    })
}

impl TreePort for JsonTreeAdapter {
    fn load_strategy(&self, path: &Path) -> Result<Strategy, FlowError> {
        let content = fs::read_to_string(path)?;
        let strategy = parse_strategy(&content).map_err(|err| match err {
            FlowError::TreeParse { reason } => FlowError::TreeParse {
                reason: format!("{}: {}", path.display(), reason),
            },
            other => other,
        })?;
        tracing::debug!(
            path = %path.display(),
            strategy = %strategy.name,
            chains = strategy.chains.len(),
            "loaded strategy tree"
        );
        Ok(strategy)
    }
}
