//! Per-sentence factor caches
//!
//! For every node that owns factors, the score vector `W·fv` of each distinct
//! value the node can take in a sentence is computed once: per token for token
//! roles, per directed bucket for distance roles and per label (plus the empty
//! label) for the label leaf. Arc roles depend on the full arc and are
//! evaluated on demand.

use tenparse_core::{NodeRole, ParameterNode, SparseFeatureVector, TensorError, TensorResult};
use tenparse_features::{Dependence, DIRECTED_BINS};

use crate::source::FeatureSource;

/// A feature vector with its per-row scores
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Active part of the feature vector, the one gradients are taken on
    pub features: SparseFeatureVector,
    /// First in-range index of the vector that was never marked active
    pub inactive: Option<usize>,
    /// `scores[row] = W[row]·fv` for every factor row
    pub scores: Vec<f64>,
}

impl CacheEntry {
    pub fn new(node: &ParameterNode, fv: SparseFeatureVector) -> TensorResult<Self> {
        let mut entry = Self {
            features: SparseFeatureVector::new(),
            inactive: None,
            scores: vec![0.0; node.rank()],
        };
        entry.refill(node, fv)?;
        Ok(entry)
    }

    /// Recompute in place for another vector, keeping the allocations.
    ///
    /// An index past the node's feature width is a schema violation and fails
    /// with [`TensorError::IndexOutOfBounds`]; the entry is left untouched.
    pub fn refill(&mut self, node: &ParameterNode, mut fv: SparseFeatureVector) -> TensorResult<()> {
        let size = node.feature_size();
        if let Some(index) = fv.indices().iter().copied().find(|&i| i >= size) {
            return Err(TensorError::IndexOutOfBounds { index, size });
        }
        for (row, score) in self.scores.iter_mut().enumerate() {
            *score = fv.iter().map(|(i, v)| node.factors()[[row, i]] * v).sum();
        }
        self.inactive = fv.indices().iter().copied().find(|&i| !node.is_active(i));
        if self.inactive.is_some() {
            fv.retain(|i| node.is_active(i));
        }
        self.features = fv;
        Ok(())
    }
}

/// What a node contributes to the tree walk of one sentence
#[derive(Debug, Clone)]
pub enum NodeCache {
    /// Grouping node without features of its own
    Group,
    /// One entry per token, read at the head
    Head(Vec<CacheEntry>),
    /// One entry per token, read at the modifier
    Modifier(Vec<CacheEntry>),
    /// One entry per directed distance bucket
    Distance(Vec<CacheEntry>),
    /// Entry 0 is the empty label, entry `1 + l` label `l`
    Label(Vec<CacheEntry>),
    /// Recomputed for every arc
    Arc,
}

impl NodeCache {
    /// Build the cache of `node` for the sentence behind `source`
    pub fn build<S: FeatureSource + ?Sized>(node: &ParameterNode, source: &S) -> TensorResult<Self> {
        let role = node.role();
        if node.feature_size() == 0 {
            return Ok(NodeCache::Group);
        }
        Ok(match Dependence::of(role) {
            Some(Dependence::Head) => NodeCache::Head(token_entries(node, source, role)?),
            Some(Dependence::Modifier) => NodeCache::Modifier(token_entries(node, source, role)?),
            Some(Dependence::Distance) => NodeCache::Distance(
                (0..DIRECTED_BINS)
                    .map(|bin| CacheEntry::new(node, source.distance(role, bin)))
                    .collect::<TensorResult<_>>()?,
            ),
            Some(Dependence::Label) => NodeCache::Label(
                std::iter::once(None)
                    .chain((0..source.label_count()).map(Some))
                    .map(|l| CacheEntry::new(node, source.label(l)))
                    .collect::<TensorResult<_>>()?,
            ),
            Some(Dependence::Arc) => NodeCache::Arc,
            None => NodeCache::Group,
        })
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        match self {
            NodeCache::Head(e) | NodeCache::Modifier(e) | NodeCache::Distance(e) | NodeCache::Label(e) => e.len(),
            NodeCache::Group | NodeCache::Arc => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn token_entries<S: FeatureSource + ?Sized>(
    node: &ParameterNode,
    source: &S,
    role: NodeRole,
) -> TensorResult<Vec<CacheEntry>> {
    (0..source.token_count())
        .map(|i| CacheEntry::new(node, source.token(role, i)))
        .collect()
}
