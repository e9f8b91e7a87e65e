//! Error types for the decomposition

use tenparse_core::{NodeRole, TensorError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecompError {
    #[error("entry {entry} has {found} coordinates, tree has {expected} nodes")]
    Arity {
        entry: usize,
        expected: usize,
        found: usize,
    },

    #[error("entry {entry}: {role:?} index {index} out of range 0..{size}")]
    OutOfRange {
        entry: usize,
        role: NodeRole,
        index: usize,
        size: usize,
    },

    #[error("entry {entry}: {role:?} index {index} was never marked active")]
    InactiveIndex {
        entry: usize,
        role: NodeRole,
        index: usize,
    },

    #[error("entry {entry}: {role:?} owns no features")]
    NoFeatures { entry: usize, role: NodeRole },

    #[error("sweep plan does not fit the tree: {0}")]
    PlanMismatch(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Tensor(#[from] TensorError),
}

pub type DecompResult<T> = Result<T, DecompError>;
