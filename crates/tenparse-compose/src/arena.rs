//! Reusable gradient buffers
//!
//! A [`GradientArena`] holds one sparse accumulator per factor row of every
//! node, indexed by preorder id. Scorers write into an arena instead of the
//! shared tree, so several sentences can be processed side by side and summed
//! before a single optimizer step. Clearing keeps the allocations.

use tenparse_core::{ParameterNode, SparseFeatureVector, TensorError, TensorResult};

#[derive(Debug, Clone, PartialEq)]
pub struct GradientArena {
    rows: Vec<Vec<SparseFeatureVector>>,
}

impl GradientArena {
    /// Empty buffers shaped like `tree`
    pub fn new(tree: &ParameterNode) -> Self {
        Self {
            rows: tree
                .preorder()
                .into_iter()
                .map(|node| {
                    let rows = if node.feature_size() > 0 { node.rank() } else { 0 };
                    vec![SparseFeatureVector::new(); rows]
                })
                .collect(),
        }
    }

    /// Number of nodes covered
    pub fn node_count(&self) -> usize {
        self.rows.len()
    }

    /// Add `scale · fv` to row `row` of node `node`
    pub fn add(&mut self, node: usize, row: usize, fv: &SparseFeatureVector, scale: f64) -> TensorResult<()> {
        let count = self.rows.len();
        let rows = self
            .rows
            .get_mut(node)
            .ok_or(TensorError::IndexOutOfBounds { index: node, size: count })?;
        let size = rows.len();
        rows.get_mut(row)
            .ok_or(TensorError::IndexOutOfBounds { index: row, size })?
            .add_scaled(fv, scale);
        Ok(())
    }

    /// Accumulated (unmerged) gradient of one row
    pub fn row(&self, node: usize, row: usize) -> Option<&SparseFeatureVector> {
        self.rows.get(node).and_then(|r| r.get(row))
    }

    /// True if nothing was accumulated since the last clear
    pub fn is_empty(&self) -> bool {
        self.rows.iter().flatten().all(SparseFeatureVector::is_empty)
    }

    /// Merge duplicate indices in place
    pub fn aggregate(&mut self) {
        self.rows.iter_mut().flatten().for_each(SparseFeatureVector::aggregate);
    }

    /// Squared norm of the accumulated gradient, duplicates merged
    pub fn squared_norm(&self) -> f64 {
        self.rows
            .iter()
            .flatten()
            .map(|acc| {
                let mut merged = acc.clone();
                merged.aggregate();
                merged.squared_norm()
            })
            .sum()
    }

    /// Add every buffer of `other` into this arena
    pub fn merge(&mut self, other: &GradientArena) -> TensorResult<()> {
        if other.rows.len() != self.rows.len() {
            return Err(TensorError::ShapeMismatch(format!(
                "arena with {} nodes merged into arena with {}",
                other.rows.len(),
                self.rows.len()
            )));
        }
        for (mine, theirs) in self.rows.iter_mut().zip(&other.rows) {
            for (acc, fv) in mine.iter_mut().zip(theirs) {
                acc.add_scaled(fv, 1.0);
            }
        }
        Ok(())
    }

    /// Move everything into the gradient accumulators of `tree` and clear
    pub fn drain_into(&mut self, tree: &mut ParameterNode) -> TensorResult<()> {
        if tree.node_count() != self.rows.len() {
            return Err(TensorError::ShapeMismatch(format!(
                "arena has {} nodes, tree has {}",
                self.rows.len(),
                tree.node_count()
            )));
        }
        let mut failure = None;
        tree.for_each_mut(&mut |id, node| {
            for (row, acc) in self.rows[id].iter().enumerate() {
                if failure.is_none() && !acc.is_empty() {
                    if let Err(e) = node.add_gradient(row, acc, 1.0) {
                        failure = Some(e);
                    }
                }
            }
        });
        self.clear();
        failure.map_or(Ok(()), Err)
    }

    pub fn clear(&mut self) {
        self.rows.iter_mut().flatten().for_each(SparseFeatureVector::clear);
    }
}
