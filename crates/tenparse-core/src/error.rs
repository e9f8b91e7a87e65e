//! Error types for parameter trees and tensor composition

use thiserror::Error;

use crate::shape::NodeRole;

/// Errors raised by parameter trees, the dual tree walk and persistence.
///
/// Schema violations (`ConfigMismatch`, `ShapeMismatch`, `IndexOutOfBounds`,
/// `InactiveFeature`) indicate a bug in feature encoding or a drift between the
/// tree used for training and the one used for decomposition. Callers are
/// expected to abort the run on them.
#[derive(Error, Debug)]
pub enum TensorError {
    #[error("Config mismatch at {node:?} node: expected feature kinds {expected:?}, found {found:?}")]
    ConfigMismatch {
        node: NodeRole,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Index {index} out of bounds for feature size {size}")]
    IndexOutOfBounds { index: usize, size: usize },

    #[error("Feature {index} of {node:?} node was never marked active")]
    InactiveFeature { node: NodeRole, index: usize },

    #[error("Invalid rank: {0} (must be > 0)")]
    InvalidRank(usize),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Optimizer state mismatch: {0}")]
    OptimizerState(String),

    #[error("Persistence error: {0}")]
    Persist(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result alias used across the core crate
pub type TensorResult<T> = std::result::Result<T, TensorError>;
