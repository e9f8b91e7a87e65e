//! # tenparse-core
//!
//! Parameter trees and the tree walk shared by every part of the tensor arc
//! scorer.
//!
//! An arc score is a sum over `R` latent components of a product of per-mode
//! contributions, each contribution being a dot product between a factor row
//! and a sparse feature vector. The modes are arranged in a tree: grouping
//! nodes multiply their children and may add features of their own, and the
//! optional lexical pair folds `extra_rank` sub-components per rank into a
//! single lane.
//!
//! This crate provides:
//!
//! - **Configuration** ([`ParserConfig`]) with named presets per tensor mode
//! - **Tree shapes** ([`TreeShape`], [`TreeLayout`]) derived from a config and a
//!   [`FeatureSchema`]
//! - **Parameter nodes** ([`ParameterNode`]) with active masks, sparse gradient
//!   accumulators, AdaGrad and MIRA updates and MIRA averaging
//! - **Dual tree walk** ([`DualTrace`]) computing node values and adjoints
//! - **Persistence** of whole parameter trees
//!
//! ## Quick Start
//!
//! ```
//! use tenparse_core::{
//!     FeatureSchema, NodeRole, OptimizerKind, ParameterNode, ParserConfig, TreeShape,
//! };
//!
//! struct Widths;
//!
//! impl FeatureSchema for Widths {
//!     fn kinds(&self, role: NodeRole) -> Vec<usize> {
//!         match role {
//!             NodeRole::Root => vec![],
//!             _ => vec![1, 10],
//!         }
//!     }
//! }
//!
//! let config = ParserConfig::threeway().rank(8);
//! let shape = TreeShape::build(&config, &Widths)?;
//! let tree = ParameterNode::from_shape(&shape, OptimizerKind::from_config(&config))?;
//!
//! assert_eq!(tree.node_count(), 4);
//! assert_eq!(tree.children()[0].factors().dim(), (8, 11));
//! # Ok::<(), tenparse_core::TensorError>(())
//! ```
//!
//! ## Update Rules
//!
//! Gradients are accumulated as sparse vectors per factor row and merged before
//! an optimizer step:
//!
//! - AdaGrad: `G += g²`, `W += α / sqrt(G + ε) · g`
//! - MIRA: `W += min(step, C) · g`, with a running total kept for averaging

#![deny(warnings)]

pub mod config;
pub mod dual;
pub mod error;
pub mod param;
pub mod persist;
pub mod shape;
pub mod sparse;


pub use config::{ParserConfig, TensorMode, UpdateMode, DEFAULT_HASH_BUCKETS};
pub use dual::{DualTrace, Term};
pub use error::{TensorError, TensorResult};
pub use param::{OptimizerKind, OptimizerState, ParameterNode};
pub use shape::{
    Combine, FeatureSchema, LayoutNode, LayoutSource, NodeRole, ShapeNode, TreeLayout, TreeShape,
};
pub use sparse::SparseFeatureVector;
