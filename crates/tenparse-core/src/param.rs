//! Parameter tree nodes
//!
//! A [`ParameterNode`] owns the dense `rank × feature_size` factor matrix of one
//! mode of the scoring tensor together with its active-feature mask, per-rank
//! sparse gradient accumulators and optimizer state (AdaGrad squared-gradient
//! sums or MIRA running totals). Child nodes are owned, so the whole model is a
//! single tree value that mirrors the [`TreeShape`] it was built from.
//!
//! # Lifecycle
//!
//! 1. [`ParameterNode::from_shape`] allocates every node with zero factors.
//! 2. [`ParameterNode::mark_active`] is called for every feature vector seen in
//!    the training data.
//! 3. [`ParameterNode::random_init`] (or a decomposition warm start) fills the
//!    active entries.
//! 4. Training alternates gradient accumulation with
//!    [`ParameterNode::apply_adagrad`] / [`ParameterNode::apply_mira`].
//! 5. With MIRA, evaluation runs between [`ParameterNode::average_for_evaluation`]
//!    and [`ParameterNode::restore_training`].
//!
//! # Examples
//!
//! ```
//! use tenparse_core::{NodeRole, OptimizerKind, ParameterNode, SparseFeatureVector};
//!
//! let mut node = ParameterNode::new(NodeRole::HeadPos, 2, OptimizerKind::AdaGrad);
//! node.allocate(&[1, 3])?;
//! node.mark_active(&SparseFeatureVector::from_indices([0, 2]))?;
//!
//! node.add_gradient(0, &SparseFeatureVector::from_indices([2]), 0.5)?;
//! node.apply_adagrad(0.1, 1e-5)?;
//! assert!(node.factors()[[0, 2]] > 0.0);
//! # Ok::<(), tenparse_core::TensorError>(())
//! ```

use scirs2_core::ndarray_ext::{Array2, ArrayView1};
use scirs2_core::random::{rngs::StdRng, Rng};

use crate::config::{ParserConfig, UpdateMode};
use crate::error::{TensorError, TensorResult};
use crate::shape::{Combine, LayoutSource, NodeRole, ShapeNode, TreeLayout, TreeShape};
use crate::sparse::SparseFeatureVector;

/// Which optimizer state a node carries
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptimizerKind {
    AdaGrad,
    Mira { margin_bound: f64 },
}

impl OptimizerKind {
    pub fn from_config(config: &ParserConfig) -> Self {
        match config.update_mode {
            UpdateMode::AdaGrad => OptimizerKind::AdaGrad,
            UpdateMode::Mira => OptimizerKind::Mira {
                margin_bound: config.mira_c,
            },
        }
    }
}

/// Per-node optimizer state, sized like the factor matrix
#[derive(Debug, Clone, PartialEq)]
pub enum OptimizerState {
    AdaGrad {
        sum_squares: Array2<f64>,
    },
    Mira {
        margin_bound: f64,
        running_total: Array2<f64>,
        /// Training factors while averaged factors are swapped in
        backup: Option<Array2<f64>>,
    },
}

impl OptimizerState {
    fn zeros(kind: OptimizerKind, rows: usize, cols: usize) -> Self {
        match kind {
            OptimizerKind::AdaGrad => OptimizerState::AdaGrad {
                sum_squares: Array2::zeros((rows, cols)),
            },
            OptimizerKind::Mira { margin_bound } => OptimizerState::Mira {
                margin_bound,
                running_total: Array2::zeros((rows, cols)),
                backup: None,
            },
        }
    }

    pub fn kind(&self) -> OptimizerKind {
        match self {
            OptimizerState::AdaGrad { .. } => OptimizerKind::AdaGrad,
            OptimizerState::Mira { margin_bound, .. } => OptimizerKind::Mira {
                margin_bound: *margin_bound,
            },
        }
    }
}

/// One mode of the low-rank scoring tensor
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterNode {
    role: NodeRole,
    combine: Combine,
    multiplicity: usize,
    rank: usize,
    kinds: Vec<usize>,
    bias_offsets: Vec<usize>,
    factors: Array2<f64>,
    active: Vec<bool>,
    grad_accum: Vec<SparseFeatureVector>,
    optimizer: OptimizerState,
    children: Vec<ParameterNode>,
}

impl ParameterNode {
    /// Create an unallocated node with `rank` factor rows
    pub fn new(role: NodeRole, rank: usize, optimizer: OptimizerKind) -> Self {
        Self {
            role,
            combine: Combine::Product,
            multiplicity: 1,
            rank,
            kinds: Vec::new(),
            bias_offsets: Vec::new(),
            factors: Array2::zeros((rank, 0)),
            active: Vec::new(),
            grad_accum: vec![SparseFeatureVector::new(); rank],
            optimizer: OptimizerState::zeros(optimizer, rank, 0),
            children: Vec::new(),
        }
    }

    /// Build and allocate the whole tree described by `shape`
    pub fn from_shape(shape: &TreeShape, optimizer: OptimizerKind) -> TensorResult<Self> {
        fn build(node: &ShapeNode, rank: usize, optimizer: OptimizerKind) -> TensorResult<ParameterNode> {
            let mut out = ParameterNode::new(node.role, rank * node.multiplicity, optimizer);
            out.combine = node.combine;
            out.multiplicity = node.multiplicity;
            out.allocate(&node.kinds)?;
            for child in &node.children {
                out.children.push(build(child, rank, optimizer)?);
            }
            Ok(out)
        }

        if shape.rank == 0 {
            return Err(TensorError::InvalidRank(shape.rank));
        }
        build(&shape.root, shape.rank, optimizer)
    }

    /// Partition the node into feature kinds and allocate its matrices.
    ///
    /// Re-allocating with identical kinds is a no-op; different kinds on an
    /// allocated node are a schema error.
    pub fn allocate(&mut self, kinds: &[usize]) -> TensorResult<()> {
        if !self.kinds.is_empty() {
            return self.expect_kinds(kinds);
        }

        let mut offsets = Vec::with_capacity(kinds.len());
        let mut size = 0;
        for &k in kinds {
            offsets.push(size);
            size += k;
        }

        self.kinds = kinds.to_vec();
        self.bias_offsets = offsets;
        self.factors = Array2::zeros((self.rank, size));
        self.active = vec![false; size];
        self.grad_accum = vec![SparseFeatureVector::new(); self.rank];
        self.optimizer = OptimizerState::zeros(self.optimizer.kind(), self.rank, size);
        Ok(())
    }

    /// Fail with a config mismatch unless the node has exactly `kinds`
    pub fn expect_kinds(&self, kinds: &[usize]) -> TensorResult<()> {
        if self.kinds != kinds {
            return Err(TensorError::ConfigMismatch {
                node: self.role,
                expected: kinds.to_vec(),
                found: self.kinds.clone(),
            });
        }
        Ok(())
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn multiplicity(&self) -> usize {
        self.multiplicity
    }

    pub fn combine(&self) -> Combine {
        self.combine
    }

    pub fn feature_size(&self) -> usize {
        self.active.len()
    }

    pub fn kinds(&self) -> &[usize] {
        &self.kinds
    }

    /// Start offset of every feature kind
    pub fn bias_offsets(&self) -> &[usize] {
        &self.bias_offsets
    }

    pub fn factors(&self) -> &Array2<f64> {
        &self.factors
    }

    pub fn factors_mut(&mut self) -> &mut Array2<f64> {
        &mut self.factors
    }

    pub fn factor_row(&self, row: usize) -> ArrayView1<'_, f64> {
        self.factors.row(row)
    }

    pub fn optimizer(&self) -> &OptimizerState {
        &self.optimizer
    }

    pub fn children(&self) -> &[ParameterNode] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [ParameterNode] {
        &mut self.children
    }

    pub fn add_child(&mut self, child: ParameterNode) {
        self.children.push(child);
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.active.get(index).copied().unwrap_or(false)
    }

    pub fn active_mask(&self) -> &[bool] {
        &self.active
    }

    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|&&a| a).count()
    }

    /// Mark every index of `fv` as observed
    pub fn mark_active(&mut self, fv: &SparseFeatureVector) -> TensorResult<()> {
        let size = self.feature_size();
        for index in fv.indices().iter().copied() {
            if index >= size {
                return Err(TensorError::IndexOutOfBounds { index, size });
            }
            self.active[index] = true;
        }
        Ok(())
    }

    /// Uniform variance-preserving initialization of the active entries.
    ///
    /// Every row draws from `[-scale·sqrt(3/n), scale·sqrt(3/n)]` with `n` the
    /// number of active indices; inactive entries stay zero.
    pub fn random_init(&mut self, scale: f64, rng: &mut StdRng) {
        let n = self.active_count();
        if n > 0 {
            let bound = scale * (3.0 / n as f64).sqrt();
            if bound > 0.0 {
                for r in 0..self.rank {
                    for (i, &on) in self.active.iter().enumerate() {
                        if on {
                            self.factors[[r, i]] = rng.random_range(-bound..bound);
                        }
                    }
                }
            }
        }
        if let OptimizerState::Mira { running_total, .. } = &mut self.optimizer {
            running_total.assign(&self.factors);
        }
        for child in &mut self.children {
            child.random_init(scale, rng);
        }
    }

    /// Overwrite factor row `row` (used by the decomposition warm start)
    pub fn set_factor_row(&mut self, row: usize, values: &[f64]) -> TensorResult<()> {
        if row >= self.rank || values.len() != self.feature_size() {
            return Err(TensorError::ShapeMismatch(format!(
                "{:?} row {} with {} values, node is {}x{}",
                self.role,
                row,
                values.len(),
                self.rank,
                self.feature_size()
            )));
        }
        for (dst, &src) in self.factors.row_mut(row).iter_mut().zip(values) {
            *dst = src;
        }
        Ok(())
    }

    /// Copy current factors into the MIRA running totals of the whole tree
    pub fn snapshot_running_totals(&mut self) {
        if let OptimizerState::Mira { running_total, .. } = &mut self.optimizer {
            running_total.assign(&self.factors);
        }
        for child in &mut self.children {
            child.snapshot_running_totals();
        }
    }

    /// Add `scale · fv` to the gradient accumulator of `row`
    pub fn add_gradient(&mut self, row: usize, fv: &SparseFeatureVector, scale: f64) -> TensorResult<()> {
        let rank = self.rank;
        let acc = self.grad_accum.get_mut(row).ok_or(TensorError::IndexOutOfBounds {
            index: row,
            size: rank,
        })?;
        acc.add_scaled(fv, scale);
        Ok(())
    }

    /// Gradient accumulator of `row`
    pub fn gradient(&self, row: usize) -> Option<&SparseFeatureVector> {
        self.grad_accum.get(row)
    }

    /// Drop accumulated gradients of the whole tree
    pub fn clear_gradients(&mut self) {
        for acc in &mut self.grad_accum {
            acc.clear();
        }
        for child in &mut self.children {
            child.clear_gradients();
        }
    }

    /// Squared norm of all accumulated gradients in the tree (duplicates merged)
    pub fn gradient_squared_norm(&self) -> f64 {
        let own: f64 = self
            .grad_accum
            .iter()
            .map(|acc| {
                let mut merged = acc.clone();
                merged.aggregate();
                merged.squared_norm()
            })
            .sum();
        own + self
            .children
            .iter()
            .map(ParameterNode::gradient_squared_norm)
            .sum::<f64>()
    }

    /// AdaGrad step over the whole tree, then clear the gradients
    pub fn apply_adagrad(&mut self, learning_rate: f64, epsilon: f64) -> TensorResult<()> {
        let sum_squares = match &mut self.optimizer {
            OptimizerState::AdaGrad { sum_squares } => sum_squares,
            OptimizerState::Mira { .. } => {
                return Err(TensorError::OptimizerState(format!(
                    "{:?} node carries MIRA state, AdaGrad step requested",
                    self.role
                )))
            }
        };

        for (r, acc) in self.grad_accum.iter_mut().enumerate() {
            acc.aggregate();
            for (i, g) in acc.iter() {
                let s = &mut sum_squares[[r, i]];
                *s += g * g;
                self.factors[[r, i]] += learning_rate / (*s + epsilon).sqrt() * g;
            }
            acc.clear();
        }

        for child in &mut self.children {
            child.apply_adagrad(learning_rate, epsilon)?;
        }
        Ok(())
    }

    /// MIRA step over the whole tree with step `min(step_size, C)`, then clear
    /// the gradients. `update_count` weights the running total for averaging.
    pub fn apply_mira(&mut self, step_size: f64, update_count: usize) -> TensorResult<()> {
        let (margin_bound, running_total, backup) = match &mut self.optimizer {
            OptimizerState::Mira {
                margin_bound,
                running_total,
                backup,
            } => (*margin_bound, running_total, backup),
            OptimizerState::AdaGrad { .. } => {
                return Err(TensorError::OptimizerState(format!(
                    "{:?} node carries AdaGrad state, MIRA step requested",
                    self.role
                )))
            }
        };
        if backup.is_some() {
            return Err(TensorError::OptimizerState(
                "MIRA step while averaged parameters are swapped in".to_string(),
            ));
        }

        let step = step_size.min(margin_bound);
        let weight = step * update_count as f64;
        for (r, acc) in self.grad_accum.iter_mut().enumerate() {
            acc.aggregate();
            for (i, g) in acc.iter() {
                self.factors[[r, i]] += step * g;
                running_total[[r, i]] += weight * g;
            }
            acc.clear();
        }

        for child in &mut self.children {
            child.apply_mira(step_size, update_count)?;
        }
        Ok(())
    }

    /// Swap in `(factors·(T+1) − running_total) / T` for evaluation, keeping the
    /// training factors for [`restore_training`](Self::restore_training)
    pub fn average_for_evaluation(&mut self, update_count: usize) -> TensorResult<()> {
        match &mut self.optimizer {
            OptimizerState::Mira {
                running_total,
                backup,
                ..
            } => {
                if backup.is_some() {
                    return Err(TensorError::OptimizerState(
                        "parameters are already averaged".to_string(),
                    ));
                }
                let training = self.factors.clone();
                if update_count > 0 {
                    let t = update_count as f64;
                    self.factors = (&training * (t + 1.0) - &*running_total) / t;
                }
                *backup = Some(training);
            }
            OptimizerState::AdaGrad { .. } => {
                return Err(TensorError::OptimizerState(
                    "averaging requires MIRA state".to_string(),
                ))
            }
        }

        for child in &mut self.children {
            child.average_for_evaluation(update_count)?;
        }
        Ok(())
    }

    /// Put the training factors back after evaluation
    pub fn restore_training(&mut self) -> TensorResult<()> {
        match &mut self.optimizer {
            OptimizerState::Mira { backup, .. } => match backup.take() {
                Some(training) => self.factors = training,
                None => {
                    return Err(TensorError::OptimizerState(
                        "restore requested without averaged parameters".to_string(),
                    ))
                }
            },
            OptimizerState::AdaGrad { .. } => {
                return Err(TensorError::OptimizerState(
                    "averaging requires MIRA state".to_string(),
                ))
            }
        }

        for child in &mut self.children {
            child.restore_training()?;
        }
        Ok(())
    }

    /// True while averaged factors are swapped in
    pub fn is_averaged(&self) -> bool {
        matches!(
            self.optimizer,
            OptimizerState::Mira {
                backup: Some(_),
                ..
            }
        )
    }

    /// Number of nodes in the tree
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(ParameterNode::node_count).sum::<usize>()
    }

    /// Nodes in preorder; index = node id in [`TreeLayout`]
    pub fn preorder(&self) -> Vec<&ParameterNode> {
        fn walk<'a>(node: &'a ParameterNode, out: &mut Vec<&'a ParameterNode>) {
            out.push(node);
            for child in &node.children {
                walk(child, out);
            }
        }
        let mut out = Vec::with_capacity(self.node_count());
        walk(self, &mut out);
        out
    }

    /// Visit every node mutably in preorder with its id
    pub fn for_each_mut<F: FnMut(usize, &mut ParameterNode)>(&mut self, f: &mut F) {
        fn walk<F: FnMut(usize, &mut ParameterNode)>(node: &mut ParameterNode, next: &mut usize, f: &mut F) {
            f(*next, node);
            *next += 1;
            for child in &mut node.children {
                walk(child, next, f);
            }
        }
        let mut next = 0;
        walk(self, &mut next, f);
    }

    /// Preorder layout of this tree with `lanes` values per unit multiplicity
    pub fn layout(&self, lanes: usize) -> TreeLayout {
        TreeLayout::from_tree(self, lanes)
    }

    pub(crate) fn parts(&self) -> NodeParts<'_> {
        NodeParts {
            role: self.role,
            combine: self.combine,
            multiplicity: self.multiplicity,
            rank: self.rank,
            kinds: &self.kinds,
            factors: &self.factors,
            active: &self.active,
            optimizer: &self.optimizer,
        }
    }

    pub(crate) fn from_parts(parts: OwnedParts, children: Vec<ParameterNode>) -> TensorResult<Self> {
        let OwnedParts {
            role,
            combine,
            multiplicity,
            rank,
            kinds,
            factors,
            active,
            optimizer,
        } = parts;

        let size: usize = kinds.iter().sum();
        if factors.dim() != (rank, size) || active.len() != size {
            return Err(TensorError::Persist(format!(
                "{:?} node: factors {:?} and mask {} disagree with rank {} and kinds {:?}",
                role,
                factors.dim(),
                active.len(),
                rank,
                kinds
            )));
        }
        let mut bias_offsets = Vec::with_capacity(kinds.len());
        let mut offset = 0;
        for &k in &kinds {
            bias_offsets.push(offset);
            offset += k;
        }

        Ok(Self {
            role,
            combine,
            multiplicity,
            rank,
            kinds,
            bias_offsets,
            factors,
            active,
            grad_accum: vec![SparseFeatureVector::new(); rank],
            optimizer,
            children,
        })
    }
}

impl LayoutSource for ParameterNode {
    fn role(&self) -> NodeRole {
        self.role
    }
    fn combine(&self) -> Combine {
        self.combine
    }
    fn multiplicity(&self) -> usize {
        self.multiplicity
    }
    fn feature_size(&self) -> usize {
        self.active.len()
    }
    fn child_nodes(&self) -> &[Self] {
        &self.children
    }
}

/// Borrowed persistent fields of a node
pub(crate) struct NodeParts<'a> {
    pub role: NodeRole,
    pub combine: Combine,
    pub multiplicity: usize,
    pub rank: usize,
    pub kinds: &'a [usize],
    pub factors: &'a Array2<f64>,
    pub active: &'a [bool],
    pub optimizer: &'a OptimizerState,
}

/// Owned persistent fields of a node
pub(crate) struct OwnedParts {
    pub role: NodeRole,
    pub combine: Combine,
    pub multiplicity: usize,
    pub rank: usize,
    pub kinds: Vec<usize>,
    pub factors: Array2<f64>,
    pub active: Vec<bool>,
    pub optimizer: OptimizerState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use scirs2_core::random::SeedableRng;

    fn leaf(optimizer: OptimizerKind) -> ParameterNode {
        let mut node = ParameterNode::new(NodeRole::HeadPos, 2, optimizer);
        node.allocate(&[1, 4]).unwrap();
        node
    }

    #[test]
    fn test_allocate_offsets() {
        let node = leaf(OptimizerKind::AdaGrad);
        assert_eq!(node.bias_offsets(), &[0, 1]);
        assert_eq!(node.feature_size(), 5);
        assert_eq!(node.factors().dim(), (2, 5));
    }

    #[test]
    fn test_allocate_mismatch_fails() {
        let mut node = leaf(OptimizerKind::AdaGrad);
        assert!(node.allocate(&[1, 4]).is_ok());
        assert!(matches!(
            node.allocate(&[1, 5]),
            Err(TensorError::ConfigMismatch { .. })
        ));
    }

    #[test]
    fn test_grouping_node_has_no_features() {
        let mut node = ParameterNode::new(NodeRole::Root, 3, OptimizerKind::AdaGrad);
        node.allocate(&[]).unwrap();
        assert_eq!(node.feature_size(), 0);
        assert_eq!(node.gradient_squared_norm(), 0.0);
    }

    #[test]
    fn test_mark_active_bounds() {
        let mut node = leaf(OptimizerKind::AdaGrad);
        node.mark_active(&SparseFeatureVector::from_indices([0, 3])).unwrap();
        assert_eq!(node.active_count(), 2);
        assert!(node.is_active(3));
        assert!(!node.is_active(4));
        assert!(matches!(
            node.mark_active(&SparseFeatureVector::from_indices([5])),
            Err(TensorError::IndexOutOfBounds { index: 5, size: 5 })
        ));
    }

    #[test]
    fn test_random_init_only_active() {
        let mut node = leaf(OptimizerKind::Mira { margin_bound: 1.0 });
        node.mark_active(&SparseFeatureVector::from_indices([1, 2])).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        node.random_init(1.0, &mut rng);

        let bound = (3.0f64 / 2.0).sqrt();
        for r in 0..2 {
            assert_eq!(node.factors()[[r, 0]], 0.0);
            assert_eq!(node.factors()[[r, 3]], 0.0);
            assert!(node.factors()[[r, 1]].abs() <= bound);
            assert!(node.factors()[[r, 1]] != 0.0);
        }
        match node.optimizer() {
            OptimizerState::Mira { running_total, .. } => assert_eq!(running_total, node.factors()),
            _ => panic!("expected MIRA state"),
        }
    }

    #[test]
    fn test_adagrad_aggregates_duplicates() {
        let mut node = leaf(OptimizerKind::AdaGrad);
        let fv = SparseFeatureVector::from_indices([2]);
        node.add_gradient(1, &fv, 0.25).unwrap();
        node.add_gradient(1, &fv, 0.25).unwrap();
        node.apply_adagrad(0.1, 1e-5).unwrap();

        let expected = 0.1 / (0.25f64 + 1e-5).sqrt() * 0.5;
        assert_eq!(node.factors()[[1, 2]], expected);
        assert!(node.gradient(1).map(|g| g.is_empty()).unwrap_or(false));
    }

    #[test]
    fn test_mira_clamps_and_tracks_total() {
        let mut node = leaf(OptimizerKind::Mira { margin_bound: 0.5 });
        node.add_gradient(0, &SparseFeatureVector::from_indices([1]), 2.0).unwrap();
        node.apply_mira(3.0, 4).unwrap();
        assert_eq!(node.factors()[[0, 1]], 1.0);
        match node.optimizer() {
            OptimizerState::Mira { running_total, .. } => assert_eq!(running_total[[0, 1]], 4.0),
            _ => panic!("expected MIRA state"),
        }
    }

    #[test]
    fn test_wrong_optimizer_rejected() {
        let mut node = leaf(OptimizerKind::AdaGrad);
        assert!(node.apply_mira(1.0, 1).is_err());
        assert!(node.average_for_evaluation(1).is_err());
        let mut node = leaf(OptimizerKind::Mira { margin_bound: 1.0 });
        assert!(node.apply_adagrad(0.1, 1e-5).is_err());
        assert!(node.restore_training().is_err());
    }

    #[test]
    fn test_average_formula() {
        let mut node = leaf(OptimizerKind::Mira { margin_bound: 10.0 });
        node.add_gradient(0, &SparseFeatureVector::from_indices([0]), 1.0).unwrap();
        node.apply_mira(1.0, 1).unwrap();
        node.add_gradient(0, &SparseFeatureVector::from_indices([0]), 1.0).unwrap();
        node.apply_mira(1.0, 2).unwrap();

        // factors = 2, total = 1 + 2 = 3, T = 2 → (2·3 − 3)/2
        node.average_for_evaluation(2).unwrap();
        assert!(node.is_averaged());
        assert_eq!(node.factors()[[0, 0]], 1.5);
        assert!(node.apply_mira(1.0, 3).is_err());
        node.restore_training().unwrap();
        assert_eq!(node.factors()[[0, 0]], 2.0);
    }

    #[test]
    fn test_preorder_ids() {
        let mut root = ParameterNode::new(NodeRole::Root, 2, OptimizerKind::AdaGrad);
        let mut typo = ParameterNode::new(NodeRole::Typo, 2, OptimizerKind::AdaGrad);
        typo.add_child(leaf(OptimizerKind::AdaGrad));
        root.add_child(leaf(OptimizerKind::AdaGrad));
        root.add_child(typo);

        let roles: Vec<_> = root.preorder().iter().map(|n| n.role()).collect();
        assert_eq!(
            roles,
            vec![NodeRole::Root, NodeRole::HeadPos, NodeRole::Typo, NodeRole::HeadPos]
        );

        let mut seen = Vec::new();
        root.for_each_mut(&mut |id, node| seen.push((id, node.role())));
        assert_eq!(seen[2], (2, NodeRole::Typo));
        assert_eq!(root.layout(2).node(2).children, vec![3]);
    }
}
