//! Property-based tests for the decomposition
//!
//! These tests use proptest to build exact rank-1 tensors over random leaf
//! sizes and check that the extracted components reproduce every entry.

#[cfg(test)]
mod tests {
    use crate::{decompose, DecompConfig, TensorEntry};
    use proptest::prelude::*;
    use tenparse_core::{NodeRole, OptimizerKind, ParameterNode, SparseFeatureVector, TensorMode};

    fn proptest_config() -> ProptestConfig {
        ProptestConfig {
            cases: 32,
            ..ProptestConfig::default()
        }
    }

    fn tree(sizes: &[usize], rank: usize) -> ParameterNode {
        let roles = [NodeRole::HeadWindow, NodeRole::ModWindow, NodeRole::Distance];
        let mut root = ParameterNode::new(NodeRole::Root, rank, OptimizerKind::AdaGrad);
        for (&role, &size) in roles.iter().zip(sizes) {
            let mut leaf = ParameterNode::new(role, rank, OptimizerKind::AdaGrad);
            leaf.allocate(&[1, size - 1]).unwrap();
            leaf.mark_active(&SparseFeatureVector::from_indices(0..size)).unwrap();
            root.add_child(leaf);
        }
        root
    }

    fn vectors() -> impl Strategy<Value = Vec<Vec<f64>>> {
        let entry = (0.5f64..2.0, prop::bool::ANY).prop_map(|(v, neg)| if neg { -v } else { v });
        prop::collection::vec(prop::collection::vec(entry, 2..5), 3)
    }

    fn grid(truth: &[Vec<f64>]) -> Vec<TensorEntry> {
        let mut entries = Vec::new();
        for (i, a) in truth[0].iter().enumerate() {
            for (j, b) in truth[1].iter().enumerate() {
                for (k, c) in truth[2].iter().enumerate() {
                    entries.push(TensorEntry::new(vec![None, Some(i), Some(j), Some(k)], a * b * c));
                }
            }
        }
        entries
    }

    fn reconstruct(tree: &ParameterNode, entry: &TensorEntry) -> f64 {
        let nodes = tree.preorder();
        (0..tree.rank())
            .map(|r| {
                (1..4)
                    .map(|id| nodes[id].factors()[[r, entry.coords[id].unwrap_or(0)]])
                    .product::<f64>()
            })
            .sum()
    }

    proptest! {
        #![proptest_config(proptest_config())]

        #[test]
        fn rank_one_round_trip(truth in vectors(), seed in 0u64..1000) {
            let sizes: Vec<usize> = truth.iter().map(Vec::len).collect();
            let mut tree = tree(&sizes, 1);
            let entries = grid(&truth);
            let config = DecompConfig::new(TensorMode::Threeway).seed(seed);
            let report = decompose(&mut tree, &entries, &config).unwrap();
            prop_assert!(report.all_converged());
            for e in &entries {
                prop_assert!((reconstruct(&tree, e) - e.value).abs() <= 1e-4);
            }
        }

        #[test]
        fn extra_ranks_leave_exact_tensor_unchanged(truth in vectors()) {
            let sizes: Vec<usize> = truth.iter().map(Vec::len).collect();
            let mut tree = tree(&sizes, 3);
            let entries = grid(&truth);
            let report = decompose(&mut tree, &entries, &DecompConfig::new(TensorMode::Threeway)).unwrap();
            prop_assert!(report.ranks[1].monitor_norm < 1e-6);
            for e in &entries {
                prop_assert!((reconstruct(&tree, e) - e.value).abs() <= 1e-4);
            }
        }
    }
}
