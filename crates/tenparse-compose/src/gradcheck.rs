//! Finite-difference checks of arc gradients
//!
//! Compares the gradient accumulated by [`SentenceScorer::add_gradient`] for a
//! single factor entry with the central difference
//! `[score(W + h) − score(W − h)] / (2h)`. Only active entries can match: the
//! scorer drops gradients of features that were never marked active.

use tenparse_core::{ParameterNode, TensorError, TensorResult};

use crate::arena::GradientArena;
use crate::scorer::SentenceScorer;
use crate::source::FeatureSource;

/// Gradient checking configuration
#[derive(Debug, Clone, Copy)]
pub struct GradCheckConfig {
    /// Step size for finite differences (default: 1e-5)
    pub epsilon: f64,
    /// Absolute tolerance (default: 1e-6)
    pub atol: f64,
}

impl Default for GradCheckConfig {
    fn default() -> Self {
        Self {
            epsilon: 1e-5,
            atol: 1e-6,
        }
    }
}

/// Result of checking one factor entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradCheckResult {
    pub analytic: f64,
    pub numeric: f64,
    pub abs_diff: f64,
    pub passed: bool,
}

/// A factor entry `factors[row, col]` of the node with preorder id `node`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactorEntry {
    pub node: usize,
    pub row: usize,
    pub col: usize,
}

/// An arc `head → modifier` with an optional label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArcProbe {
    pub head: usize,
    pub modifier: usize,
    pub label: Option<usize>,
}

fn perturbed(tree: &ParameterNode, at: FactorEntry, delta: f64) -> TensorResult<ParameterNode> {
    let mut copy = tree.clone();
    let mut found = false;
    copy.for_each_mut(&mut |id, node| {
        if id == at.node {
            if let Some(v) = node.factors_mut().get_mut([at.row, at.col]) {
                *v += delta;
                found = true;
            }
        }
    });
    if !found {
        return Err(TensorError::IndexOutOfBounds {
            index: at.col,
            size: tree.preorder().get(at.node).map_or(0, |n| n.feature_size()),
        });
    }
    Ok(copy)
}

/// Check `∂score(arc)/∂factors[entry]` against a central difference
pub fn check_entry<S: FeatureSource + Clone>(
    tree: &ParameterNode,
    source: &S,
    arc: ArcProbe,
    entry: FactorEntry,
    config: &GradCheckConfig,
) -> TensorResult<GradCheckResult> {
    let mut arena = GradientArena::new(tree);
    let mut scorer = SentenceScorer::new(tree, source.clone())?;
    scorer.add_gradient(arc.head, arc.modifier, arc.label, 1.0, &mut arena)?;
    arena.aggregate();
    let analytic = arena
        .row(entry.node, entry.row)
        .and_then(|g| g.iter().find(|&(i, _)| i == entry.col).map(|(_, v)| v))
        .unwrap_or(0.0);

    let h = config.epsilon;
    let plus_tree = perturbed(tree, entry, h)?;
    let minus_tree = perturbed(tree, entry, -h)?;
    let plus = SentenceScorer::new(&plus_tree, source.clone())?.score(arc.head, arc.modifier, arc.label)?;
    let minus = SentenceScorer::new(&minus_tree, source.clone())?.score(arc.head, arc.modifier, arc.label)?;
    let numeric = (plus - minus) / (2.0 * h);

    let abs_diff = (analytic - numeric).abs();
    Ok(GradCheckResult {
        analytic,
        numeric,
        abs_diff,
        passed: abs_diff <= config.atol,
    })
}
