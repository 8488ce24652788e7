//! Error types shared by the loaders and the compute engine.

use std::path::PathBuf;

use thiserror::Error;

/// A single row (topology or telemetry) that could not be decoded.
///
/// These never abort a run: callers count them and move on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowError {
    #[error("row has {found} fields, expected at least {expected}")]
    TooFewFields { found: usize, expected: usize },

    #[error("field {field} is not a valid number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("field {field} is not a valid timestamp: {value:?}")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("orientation must be 0 or 1, got {0}")]
    InvalidOrientation(i32),
}

/// Failures that make the route topology unusable.
#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("required topology file not found: {}", .0.display())]
    MissingFile(PathBuf),
}
