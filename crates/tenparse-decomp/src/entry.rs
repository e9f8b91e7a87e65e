//! Observed entries of the scoring tensor
//!
//! A [`TensorEntry`] is one non-zero weight of a pretrained flat model,
//! decoded into the feature index it addresses on every node of the parameter
//! tree. `None` means the entry does not reach that node: a leaf without a
//! coordinate contributes zero to the product it sits in, and a grouping node
//! with features of its own contributes only its children.

use tenparse_core::ParameterNode;

use crate::error::{DecompError, DecompResult};

#[derive(Debug, Clone, PartialEq)]
pub struct TensorEntry {
    /// Feature index per node, in preorder
    pub coords: Vec<Option<usize>>,
    pub value: f64,
}

impl TensorEntry {
    pub fn new(coords: Vec<Option<usize>>, value: f64) -> Self {
        Self { coords, value }
    }

    /// Coordinate on node `id`
    #[inline]
    pub fn coord(&self, id: usize) -> Option<usize> {
        self.coords.get(id).copied().flatten()
    }

    /// Check every coordinate against the shape and active mask of `tree`.
    ///
    /// `index` is the position of the entry in its list, used for reporting.
    pub fn validate(&self, tree: &ParameterNode, index: usize) -> DecompResult<()> {
        let nodes = tree.preorder();
        if self.coords.len() != nodes.len() {
            return Err(DecompError::Arity {
                entry: index,
                expected: nodes.len(),
                found: self.coords.len(),
            });
        }
        for (node, coord) in nodes.iter().zip(&self.coords) {
            let Some(i) = *coord else {
                continue;
            };
            let size = node.feature_size();
            if size == 0 {
                return Err(DecompError::NoFeatures {
                    entry: index,
                    role: node.role(),
                });
            }
            if i >= size {
                return Err(DecompError::OutOfRange {
                    entry: index,
                    role: node.role(),
                    index: i,
                    size,
                });
            }
            if !node.is_active(i) {
                return Err(DecompError::InactiveIndex {
                    entry: index,
                    role: node.role(),
                    index: i,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenparse_core::{NodeRole, OptimizerKind, SparseFeatureVector};

    fn tree() -> ParameterNode {
        let mut root = ParameterNode::new(NodeRole::Root, 1, OptimizerKind::AdaGrad);
        let mut leaf = ParameterNode::new(NodeRole::HeadPos, 1, OptimizerKind::AdaGrad);
        leaf.allocate(&[1, 2]).unwrap();
        leaf.mark_active(&SparseFeatureVector::from_indices([0, 1])).unwrap();
        root.add_child(leaf);
        root
    }

    #[test]
    fn test_validate() {
        let tree = tree();
        assert!(TensorEntry::new(vec![None, Some(1)], 1.0).validate(&tree, 0).is_ok());
        assert!(matches!(
            TensorEntry::new(vec![None, Some(2)], 1.0).validate(&tree, 4),
            Err(DecompError::InactiveIndex { entry: 4, index: 2, .. })
        ));
        assert!(matches!(
            TensorEntry::new(vec![None, Some(3)], 1.0).validate(&tree, 0),
            Err(DecompError::OutOfRange { size: 3, .. })
        ));
        assert!(matches!(
            TensorEntry::new(vec![Some(0), Some(0)], 1.0).validate(&tree, 0),
            Err(DecompError::NoFeatures {
                role: NodeRole::Root,
                ..
            })
        ));
        assert!(matches!(
            TensorEntry::new(vec![Some(0)], 1.0).validate(&tree, 0),
            Err(DecompError::Arity { expected: 2, found: 1, .. })
        ));
    }
}
