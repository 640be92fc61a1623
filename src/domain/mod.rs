//! Core domain types and logic.

pub mod backtest;
pub mod bar;
pub mod condition;
pub mod condition_eval;
pub mod config_validation;
pub mod error;
pub mod evaluator;
pub mod flow;
pub mod indicator;
pub mod indicator_cache;
pub mod metrics;
pub mod price_matrix;
pub mod tree_validation;
pub mod weighting;
