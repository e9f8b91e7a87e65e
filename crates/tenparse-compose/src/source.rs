//! Feature sources of one sentence
//!
//! The scorer never looks at tags or words. It asks a [`FeatureSource`] for
//! the sparse vector of each node role, keyed by what that role depends on:
//! a token, a distance bucket, a label, or the whole arc.

use tenparse_core::{NodeRole, SparseFeatureVector};
use tenparse_features::{EncodedSentence, FeatureEncoder};

/// Per-sentence access to the feature vectors of every node role
pub trait FeatureSource {
    /// Number of tokens including the root
    fn token_count(&self) -> usize;

    /// Size of the label alphabet
    fn label_count(&self) -> usize;

    /// Vector of a token role (head or modifier side) at token `i`
    fn token(&self, role: NodeRole, i: usize) -> SparseFeatureVector;

    /// Vector of a distance role for the directed bucket `bin`
    fn distance(&self, role: NodeRole, bin: usize) -> SparseFeatureVector;

    /// Vector of the label leaf; `None` is the empty label
    fn label(&self, label: Option<usize>) -> SparseFeatureVector;

    /// Vector of an arc role for `head → modifier` with `label`
    fn arc(&self, role: NodeRole, head: usize, modifier: usize, label: Option<usize>) -> SparseFeatureVector;
}

/// [`FeatureSource`] backed by the feature encoder
#[derive(Debug, Clone, Copy)]
pub struct EncodedInstance<'a> {
    encoder: &'a FeatureEncoder,
    sentence: &'a EncodedSentence,
}

impl<'a> EncodedInstance<'a> {
    pub fn new(encoder: &'a FeatureEncoder, sentence: &'a EncodedSentence) -> Self {
        Self { encoder, sentence }
    }

    pub fn sentence(&self) -> &'a EncodedSentence {
        self.sentence
    }
}

impl FeatureSource for EncodedInstance<'_> {
    fn token_count(&self) -> usize {
        self.sentence.len()
    }

    fn label_count(&self) -> usize {
        self.encoder.dims().labels
    }

    fn token(&self, role: NodeRole, i: usize) -> SparseFeatureVector {
        self.encoder.token_features(role, self.sentence, i)
    }

    fn distance(&self, role: NodeRole, bin: usize) -> SparseFeatureVector {
        if role == NodeRole::DistanceTypo {
            self.encoder.distance_typo_features(bin, self.sentence.language)
        } else {
            self.encoder.distance_features(bin)
        }
    }

    fn label(&self, label: Option<usize>) -> SparseFeatureVector {
        self.encoder.label_features(label)
    }

    fn arc(&self, role: NodeRole, head: usize, modifier: usize, label: Option<usize>) -> SparseFeatureVector {
        self.encoder.arc_features(role, self.sentence, head, modifier, label)
    }
}
