//! Property-based tests for decoding
//!
//! Decoded heads must always form a tree rooted at token 0 whose score is at
//! least that of any simple projective tree.

#[cfg(test)]
mod tests {
    use crate::decoder::{ArcScores, DependencyDecoder, EisnerDecoder};
    use proptest::prelude::*;

    fn proptest_config() -> ProptestConfig {
        ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        }
    }

    fn scores_strategy() -> impl Strategy<Value = ArcScores> {
        (2usize..9).prop_flat_map(|n| {
            prop::collection::vec(-5.0f64..5.0, n * n).prop_map(move |values| {
                let mut scores = ArcScores::new(n);
                for h in 0..n {
                    for m in 1..n {
                        if h != m {
                            scores.set(h, m, values[h * n + m]);
                        }
                    }
                }
                scores
            })
        })
    }

    fn reaches_root(heads: &[i32], m: usize) -> bool {
        let mut a = m;
        for _ in 0..heads.len() {
            if a == 0 {
                return true;
            }
            match usize::try_from(heads[a]) {
                Ok(h) if h < heads.len() && h != a => a = h,
                _ => return false,
            }
        }
        false
    }

    fn chain(n: usize) -> Vec<i32> {
        (0..n).map(|m| m as i32 - 1).collect()
    }

    fn flat(n: usize) -> Vec<i32> {
        (0..n).map(|m| if m == 0 { -1 } else { 0 }).collect()
    }

    proptest! {
        #![proptest_config(proptest_config())]

        #[test]
        fn prop_decoded_heads_form_a_tree(scores in scores_strategy()) {
            let heads = EisnerDecoder.decode(&scores, None).unwrap();
            prop_assert_eq!(heads.len(), scores.len());
            prop_assert_eq!(heads[0], -1);
            for m in 1..heads.len() {
                prop_assert!(reaches_root(&heads, m));
            }
        }

        #[test]
        fn prop_decoded_tree_beats_simple_trees(scores in scores_strategy()) {
            let n = scores.len();
            let best = scores.tree_score(&EisnerDecoder.decode(&scores, None).unwrap());
            prop_assert!(best >= scores.tree_score(&chain(n)) - 1e-9);
            prop_assert!(best >= scores.tree_score(&flat(n)) - 1e-9);
        }

        #[test]
        fn prop_augmented_prediction_outscores_gold(scores in scores_strategy()) {
            let gold = chain(scores.len());
            let heads = EisnerDecoder.decode(&scores, Some(&gold)).unwrap();
            let hamming = (1..heads.len()).filter(|&m| heads[m] != gold[m]).count() as f64;
            prop_assert!(scores.tree_score(&heads) + hamming >= scores.tree_score(&gold) - 1e-9);
        }
    }
}
