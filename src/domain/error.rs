//! Domain error types.
//!
//! Configuration and structural problems are errors. Data insufficiency
//! inside a run (warm-up, short histories) is not: it shows up as undefined
//! values. Only when a run has nothing to simulate at all (an anchor without
//! bars, an empty aligned domain) does the pipeline report `NoData`.

/// Top-level error type for flowtrader.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid window {window} for {context}: window must be at least {min}")]
    InvalidWindow {
        context: String,
        window: i64,
        min: i64,
    },

    #[error("no anchor tickers: the strategy references no tradable or indicator tickers")]
    EmptyAnchors,

    #[error("invalid comparator: {0}")]
    InvalidComparator(String),

    #[error("bars for {ticker} are not strictly increasing at {date}")]
    UnorderedBars { ticker: String, date: String },

    #[error("failed to parse strategy tree: {reason}")]
    TreeParse { reason: String },

    #[error("invalid node {node_id}: {reason}")]
    TreeInvalid { node_id: String, reason: String },

    #[error("call chain cycle: {chain_id} is already on the call path ({path})")]
    CallCycle { chain_id: String, path: String },

    #[error("node {node_id} calls unknown chain {chain_id}")]
    DanglingCall { node_id: String, chain_id: String },

    #[error("no data for {ticker}")]
    NoData { ticker: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&FlowError> for std::process::ExitCode {
    fn from(err: &FlowError) -> Self {
        let code: u8 = match err {
            FlowError::Io(_) => 1,
            FlowError::ConfigParse { .. }
            | FlowError::ConfigMissing { .. }
            | FlowError::ConfigInvalid { .. }
            | FlowError::InvalidWindow { .. }
            | FlowError::EmptyAnchors
            | FlowError::InvalidComparator(_) => 2,
            FlowError::DataSource { .. } | FlowError::UnorderedBars { .. } => 3,
            FlowError::TreeParse { .. }
            | FlowError::TreeInvalid { .. }
            | FlowError::CallCycle { .. }
            | FlowError::DanglingCall { .. } => 4,
            FlowError::NoData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
