//! # tenparse-decomp
//!
//! Warm start of a parameter tree by greedy rank-1 power iteration.
//!
//! A pretrained flat model gives one weight per hashed arc feature. Decoded
//! into per-node feature indices, the non-zero weights are observed entries
//! ([`TensorEntry`]) of the tensor the parameter tree represents. [`decompose`]
//! extracts the `R` rank-1 components of that tensor one at a time:
//!
//! 1. random start vectors on the active indices of every node
//! 2. alternating re-estimation of each node with the others fixed, the
//!    earlier components deflated
//! 3. stop when the norm of the monitor node moves by less than the tolerance,
//!    or after `max_iters` sweeps (logged, not an error)
//!
//! Node order and target norms come from a [`SweepPlan`] built for the tensor
//! mode of the tree.
//!
//! ## Quick Start
//!
//! ```
//! use tenparse_core::{NodeRole, OptimizerKind, ParameterNode, SparseFeatureVector, TensorMode};
//! use tenparse_decomp::{decompose, DecompConfig, TensorEntry};
//!
//! let mut root = ParameterNode::new(NodeRole::Root, 1, OptimizerKind::AdaGrad);
//! for role in [NodeRole::HeadWindow, NodeRole::ModWindow, NodeRole::Distance] {
//!     let mut leaf = ParameterNode::new(role, 1, OptimizerKind::AdaGrad);
//!     leaf.allocate(&[1, 2])?;
//!     leaf.mark_active(&SparseFeatureVector::from_indices(0..3))?;
//!     root.add_child(leaf);
//! }
//!
//! let entries = vec![
//!     TensorEntry::new(vec![None, Some(1), Some(2), Some(0)], 2.0),
//!     TensorEntry::new(vec![None, Some(2), Some(2), Some(0)], 4.0),
//! ];
//! let report = decompose(&mut root, &entries, &DecompConfig::new(TensorMode::Threeway))?;
//! assert!(report.all_converged());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(warnings)]

pub mod entry;
pub mod error;
pub mod plan;
pub mod power;

#[cfg(test)]
mod property_tests;

pub use entry::TensorEntry;
pub use error::{DecompError, DecompResult};
pub use plan::{SweepPlan, SweepStep, Target};
pub use power::{decompose, DecompConfig, DecompReport, RankReport};
