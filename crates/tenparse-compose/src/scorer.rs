//! Arc scoring and gradients for one sentence
//!
//! [`SentenceScorer`] binds a parameter tree to the feature source of one
//! sentence. Construction fills the per-node caches; after that an arc score
//! is a single walk over length-`R` vectors:
//!
//! ```text
//! score(h, m, l) = Σ_r  node_r(root)
//! node_r(leaf)   = cache[value](r)
//! node_r(group)  = Π_children node_r(child)  (+ own_r if the group has features)
//! ```
//!
//! The gradient walk reuses the same traversal ([`DualTrace`]): the adjoint of
//! a node at lane `r` is the product of its siblings at `r` times the adjoint
//! of the parent, and the gradient of factor row `r` is `adjoint_r · fv`.
//!
//! Every tensor mode goes through this one implementation; the modes differ
//! only in the tree the scorer is given.

use tenparse_core::{
    DualTrace, NodeRole, ParameterNode, TensorError, TensorResult, Term, TreeLayout,
};
use tenparse_features::arc_bin;

use crate::arena::GradientArena;
use crate::cache::{CacheEntry, NodeCache};
use crate::source::FeatureSource;

/// Behaviour on gradients that touch features never marked active.
///
/// Indices past a node's feature width are always an error, whatever the
/// options; this only governs in-range indices that no gold arc fired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScorerOptions {
    /// Fail with [`TensorError::InactiveFeature`] instead of dropping them
    pub strict_active: bool,
}

impl ScorerOptions {
    pub fn strict() -> Self {
        Self {
            strict_active: true,
        }
    }
}

/// Arc scorer for one sentence
#[derive(Debug)]
pub struct SentenceScorer<'a, S: FeatureSource> {
    tree: &'a ParameterNode,
    nodes: Vec<&'a ParameterNode>,
    source: S,
    layout: TreeLayout,
    caches: Vec<NodeCache>,
    arc_entries: Vec<Option<CacheEntry>>,
    trace: DualTrace,
    options: ScorerOptions,
}

impl<'a, S: FeatureSource> SentenceScorer<'a, S> {
    /// Build the caches of every node of `tree` for `source`
    pub fn new(tree: &'a ParameterNode, source: S) -> TensorResult<Self> {
        Self::with_options(tree, source, ScorerOptions::default())
    }

    pub fn with_options(tree: &'a ParameterNode, source: S, options: ScorerOptions) -> TensorResult<Self> {
        let nodes = tree.preorder();
        let layout = tree.layout(tree.rank());
        for (id, node) in nodes.iter().enumerate() {
            if node.feature_size() > 0 && node.rank() != layout.width(id) {
                return Err(TensorError::ShapeMismatch(format!(
                    "{:?} node has {} factor rows, the walk carries {} values",
                    node.role(),
                    node.rank(),
                    layout.width(id)
                )));
            }
        }

        let caches = nodes
            .iter()
            .map(|n| NodeCache::build(n, &source))
            .collect::<TensorResult<Vec<_>>>()?;
        log::trace!(
            "cached {} entries over {} nodes for a {}-token sentence",
            caches.iter().map(NodeCache::len).sum::<usize>(),
            nodes.len(),
            source.token_count()
        );

        Ok(Self {
            tree,
            trace: DualTrace::new(&layout),
            arc_entries: vec![None; nodes.len()],
            nodes,
            source,
            layout,
            caches,
            options,
        })
    }

    pub fn tree(&self) -> &'a ParameterNode {
        self.tree
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn layout(&self) -> &TreeLayout {
        &self.layout
    }

    /// Number of tokens including the root
    pub fn len(&self) -> usize {
        self.source.token_count()
    }

    pub fn is_empty(&self) -> bool {
        self.source.token_count() <= 1
    }

    /// Score of the arc `head → modifier` with `label` (`None` = empty label)
    pub fn score(&mut self, head: usize, modifier: usize, label: Option<usize>) -> TensorResult<f64> {
        self.forward(head, modifier, label)
    }

    /// Add `weight · ∂score/∂W` of the arc into `arena` and return the score
    pub fn add_gradient(
        &mut self,
        head: usize,
        modifier: usize,
        label: Option<usize>,
        weight: f64,
        arena: &mut GradientArena,
    ) -> TensorResult<f64> {
        if arena.node_count() != self.nodes.len() {
            return Err(TensorError::ShapeMismatch(format!(
                "arena has {} nodes, tree has {}",
                arena.node_count(),
                self.nodes.len()
            )));
        }
        let score = self.forward(head, modifier, label)?;
        if weight == 0.0 {
            return Ok(score);
        }
        self.trace.backward(&self.layout, weight)?;

        let bin = arc_bin(head, modifier);
        for id in 0..self.nodes.len() {
            if !self.trace.reached(id) {
                continue;
            }
            let Some(entry) = self.entry(id, head, modifier, bin, label) else {
                continue;
            };
            if let (true, Some(index)) = (self.options.strict_active, entry.inactive) {
                return Err(TensorError::InactiveFeature {
                    node: self.nodes[id].role(),
                    index,
                });
            }
            if entry.features.is_empty() {
                continue;
            }
            for (row, &adjoint) in self.trace.adjoint(id).iter().enumerate() {
                if adjoint != 0.0 {
                    arena.add(id, row, &entry.features, adjoint)?;
                }
            }
        }
        Ok(score)
    }

    /// Accumulate `weight` times the feature difference between two trees.
    ///
    /// Arcs on which `gold` and `predicted` agree (same head and, when
    /// `labels` is set, same label) cancel and are skipped; every other gold
    /// arc gets `+weight` and every other predicted arc `−weight`.
    pub fn add_tree_difference(
        &mut self,
        gold: (&[i32], &[Option<usize>]),
        predicted: (&[i32], &[Option<usize>]),
        labels: bool,
        weight: f64,
        arena: &mut GradientArena,
    ) -> TensorResult<()> {
        let n = self.len();
        for tree in [gold, predicted] {
            if tree.0.len() != n || tree.1.len() != n {
                return Err(TensorError::ShapeMismatch(format!(
                    "tree of {} heads and {} labels for a {}-token sentence",
                    tree.0.len(),
                    tree.1.len(),
                    n
                )));
            }
        }

        for m in 1..n {
            let gold_label = if labels { gold.1[m] } else { None };
            let pred_label = if labels { predicted.1[m] } else { None };
            if gold.0[m] == predicted.0[m] && gold_label == pred_label {
                continue;
            }
            if let Ok(h) = usize::try_from(gold.0[m]) {
                self.add_gradient(h, m, gold_label, weight, arena)?;
            }
            if let Ok(h) = usize::try_from(predicted.0[m]) {
                self.add_gradient(h, m, pred_label, -weight, arena)?;
            }
        }
        Ok(())
    }

    /// Sum of arc scores of a whole tree (`-1` heads are skipped)
    pub fn tree_score(&mut self, heads: &[i32], labels: Option<&[Option<usize>]>) -> TensorResult<f64> {
        let mut total = 0.0;
        for (m, &h) in heads.iter().enumerate().skip(1) {
            if let Ok(h) = usize::try_from(h) {
                let label = labels.and_then(|l| l.get(m).copied().flatten());
                total += self.score(h, m, label)?;
            }
        }
        Ok(total)
    }

    fn check_arc(&self, head: usize, modifier: usize, label: Option<usize>) -> TensorResult<()> {
        let n = self.len();
        for index in [head, modifier] {
            if index >= n {
                return Err(TensorError::IndexOutOfBounds { index, size: n });
            }
        }
        if let Some(l) = label {
            let size = self.source.label_count();
            if l >= size {
                return Err(TensorError::IndexOutOfBounds { index: l, size });
            }
        }
        Ok(())
    }

    fn fill_arc_entries(&mut self, head: usize, modifier: usize, label: Option<usize>) -> TensorResult<()> {
        for (id, cache) in self.caches.iter().enumerate() {
            if !matches!(cache, NodeCache::Arc) {
                continue;
            }
            let node = self.nodes[id];
            let fv = self.source.arc(node.role(), head, modifier, label);
            match &mut self.arc_entries[id] {
                Some(entry) => entry.refill(node, fv)?,
                slot => *slot = Some(CacheEntry::new(node, fv)?),
            }
        }
        Ok(())
    }

    fn forward(&mut self, head: usize, modifier: usize, label: Option<usize>) -> TensorResult<f64> {
        self.check_arc(head, modifier, label)?;
        self.fill_arc_entries(head, modifier, label)?;
        let bin = arc_bin(head, modifier);
        let label_slot = label.map_or(0, |l| l + 1);

        let Self {
            layout,
            caches,
            arc_entries,
            trace,
            ..
        } = self;
        let (layout, caches, arc_entries) = (&*layout, &*caches, &*arc_entries);
        trace.forward(layout, |id| {
            let node = layout.node(id);
            let entry = match &caches[id] {
                NodeCache::Group => return Ok(Term::Children),
                NodeCache::Head(e) => &e[head],
                NodeCache::Modifier(e) => &e[modifier],
                NodeCache::Distance(e) => &e[bin],
                NodeCache::Label(e) => &e[label_slot],
                NodeCache::Arc => arc_entries[id].as_ref().ok_or_else(|| {
                    TensorError::ShapeMismatch(format!("{:?} arc entry missing", node.role))
                })?,
            };
            Ok(if node.is_leaf() {
                Term::Leaf(&entry.scores)
            } else {
                Term::Sum(&entry.scores)
            })
        })
    }

    fn entry(
        &self,
        id: usize,
        head: usize,
        modifier: usize,
        bin: usize,
        label: Option<usize>,
    ) -> Option<&CacheEntry> {
        match &self.caches[id] {
            NodeCache::Group => None,
            NodeCache::Head(e) => e.get(head),
            NodeCache::Modifier(e) => e.get(modifier),
            NodeCache::Distance(e) => e.get(bin),
            NodeCache::Label(e) => e.get(label.map_or(0, |l| l + 1)),
            NodeCache::Arc => self.arc_entries[id].as_ref(),
        }
    }

    /// Roles of the nodes in walk order
    pub fn roles(&self) -> Vec<NodeRole> {
        self.nodes.iter().map(|n| n.role()).collect()
    }
}
