//! Property-based tests for arc scoring
//!
//! These tests use proptest to compare gradients with finite differences and
//! to check that gradients scale linearly with the arc weight.

#[cfg(test)]
mod tests {
    use crate::{
        check_entry, ArcProbe, FactorEntry, FeatureSource, GradCheckConfig, GradientArena,
        SentenceScorer,
    };
    use proptest::prelude::*;
    use scirs2_core::random::{rngs::StdRng, SeedableRng};
    use tenparse_core::{
        FeatureSchema, NodeRole, OptimizerKind, ParameterNode, ParserConfig, SparseFeatureVector,
        TreeShape,
    };

    fn proptest_config() -> ProptestConfig {
        ProptestConfig {
            cases: 32,
            ..ProptestConfig::default()
        }
    }

    struct Widths;

    impl FeatureSchema for Widths {
        fn kinds(&self, role: NodeRole) -> Vec<usize> {
            match role {
                NodeRole::Root | NodeRole::LexicalPair => vec![],
                NodeRole::Distance => vec![1, 14],
                NodeRole::Label => vec![1, 2],
                NodeRole::HeadWindow | NodeRole::ModWindow => vec![1, 4],
                _ => vec![1, 3],
            }
        }
    }

    #[derive(Debug, Clone)]
    struct Toy {
        tokens: usize,
    }

    impl FeatureSource for Toy {
        fn token_count(&self) -> usize {
            self.tokens
        }
        fn label_count(&self) -> usize {
            2
        }
        fn token(&self, role: NodeRole, i: usize) -> SparseFeatureVector {
            let width = if matches!(role, NodeRole::HeadWindow | NodeRole::ModWindow) { 4 } else { 3 };
            SparseFeatureVector::from_pairs([(0, 1.0), (1 + i % width, 0.5 + i as f64)])
        }
        fn distance(&self, _role: NodeRole, bin: usize) -> SparseFeatureVector {
            SparseFeatureVector::from_indices([0, 1 + bin])
        }
        fn label(&self, label: Option<usize>) -> SparseFeatureVector {
            SparseFeatureVector::from_indices(std::iter::once(0).chain(label.map(|l| 1 + l)))
        }
        fn arc(&self, _role: NodeRole, _head: usize, _modifier: usize, _label: Option<usize>) -> SparseFeatureVector {
            SparseFeatureVector::new()
        }
    }

    fn tree(config: &ParserConfig, seed: u64) -> ParameterNode {
        let shape = TreeShape::build(config, &Widths).unwrap();
        let mut tree = ParameterNode::from_shape(&shape, OptimizerKind::AdaGrad).unwrap();
        tree.for_each_mut(&mut |_, node| {
            let size = node.feature_size();
            node.mark_active(&SparseFeatureVector::from_indices(0..size)).unwrap();
        });
        tree.random_init(1.0, &mut StdRng::seed_from_u64(seed));
        tree
    }

    fn arc_strategy() -> impl Strategy<Value = (usize, usize, Option<usize>)> {
        (0usize..5, 1usize..5, prop::option::of(0usize..2))
            .prop_filter("no self loops", |(h, m, _)| h != m)
    }

    proptest! {
        #![proptest_config(proptest_config())]

        #[test]
        fn gradient_matches_central_difference(
            (head, modifier, label) in arc_strategy(),
            seed in 0u64..500,
            node_pick in 0usize..16,
            col_pick in 0usize..16,
            threeway in prop::bool::ANY,
        ) {
            let base = if threeway { ParserConfig::threeway() } else { ParserConfig::multiway() };
            let config = base.rank(3).learn_label(true);
            let tree = tree(&config, seed);
            let feature_nodes: Vec<usize> = tree.layout(1).feature_nodes().collect();
            let node = feature_nodes[node_pick % feature_nodes.len()];
            let size = tree.preorder()[node].feature_size();

            let result = check_entry(
                &tree,
                &Toy { tokens: 5 },
                ArcProbe { head, modifier, label },
                FactorEntry { node, row: seed as usize % 3, col: col_pick % size },
                &GradCheckConfig::default(),
            ).unwrap();
            prop_assert!(result.passed, "{:?}", result);
        }

        #[test]
        fn gradient_scales_with_weight(
            (head, modifier, label) in arc_strategy(),
            weight in -3.0f64..3.0,
        ) {
            let config = ParserConfig::multiway().rank(2).learn_label(true);
            let tree = tree(&config, 7);
            let mut scorer = SentenceScorer::new(&tree, Toy { tokens: 5 }).unwrap();
            let mut unit = GradientArena::new(&tree);
            let mut scaled = GradientArena::new(&tree);
            scorer.add_gradient(head, modifier, label, 1.0, &mut unit).unwrap();
            scorer.add_gradient(head, modifier, label, weight, &mut scaled).unwrap();

            let expected = weight * weight * unit.squared_norm();
            prop_assert!((scaled.squared_norm() - expected).abs() <= 1e-9 * (1.0 + expected));
        }
    }
}
