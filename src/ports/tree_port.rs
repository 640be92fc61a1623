//! Strategy tree loading port trait.

use crate::domain::error::FlowError;
use crate::domain::flow::Strategy;
use std::path::Path;

pub trait TreePort {
    fn load_strategy(&self, path: &Path) -> Result<Strategy, FlowError>;
}
