//! Property-based tests for distance buckets and arc codes
//!
//! These tests use proptest to check the bucketing symmetry and that every
//! emitted arc code decodes and lands inside the parameter tree.

#[cfg(test)]
mod tests {
    use crate::{
        binned_distance, bucket, ArcFeatureExtractor, FeatureEncoder, Sentence, Typology,
        Vocabulary, DIRECTED_BINS, MAX_DISTANCE,
    };
    use proptest::prelude::*;
    use tenparse_core::{FeatureSchema, ParserConfig, TreeShape};

    fn proptest_config() -> ProptestConfig {
        ProptestConfig {
            cases: 48,
            ..ProptestConfig::default()
        }
    }

    const TAGS: [&str; 6] = ["NOUN", "VERB", "ADP", "PRON", "ADJ", "DET"];
    const TABLE: &str = "2 5 2\n2 2 2 2 2\nen 0 0 0 1 0 0\nja 1 1 1 0 1 1\n";

    /// Random sentence with a right-branching gold chain
    fn sentence_strategy() -> impl Strategy<Value = Sentence> {
        (prop::collection::vec(0usize..TAGS.len(), 2..9), prop::bool::ANY).prop_map(|(tags, ja)| {
            let mut sentence = Sentence::new(if ja { "ja" } else { "en" });
            for (i, &t) in tags.iter().enumerate() {
                let label = if i % 2 == 0 { "nsubj" } else { "obj" };
                sentence.push(&format!("w{}", i), TAGS[t], i as i32, label);
            }
            sentence
        })
    }

    proptest! {
        #![proptest_config(proptest_config())]

        // Left arcs land exactly MAX_DISTANCE buckets above the mirrored right arc
        #[test]
        fn binned_distance_is_mirrored(x in 1i64..10_000) {
            let right = binned_distance(x);
            let left = binned_distance(-x);
            prop_assert!(right < MAX_DISTANCE);
            prop_assert_eq!(left, right + MAX_DISTANCE);
            prop_assert!(left < DIRECTED_BINS);
        }

        #[test]
        fn bucket_is_in_range(code in any::<u64>(), buckets in 1usize..1_000_000) {
            prop_assert!(bucket(code, buckets) < buckets);
        }

        // Every code decodes, and every harvested coordinate fits its node
        #[test]
        fn codes_decode_and_fit_the_tree(sentence in sentence_strategy(), extended in prop::bool::ANY) {
            let config = if extended {
                ParserConfig::extended().learn_label(true)
            } else {
                ParserConfig::hierarchical().learn_label(true)
            };
            let vocab = Vocabulary::build(&[sentence.clone()]);
            let typology = Typology::parse(TABLE).unwrap();
            let encoder = FeatureEncoder::new(&config, vocab, Some(typology), None).unwrap();
            let layout = TreeShape::build(&config, &encoder).unwrap().layout(1);
            let extractor = ArcFeatureExtractor::new(&encoder, 1 << 16).unwrap();
            let sent = encoder.encode(&sentence).unwrap();

            for (h, m, label) in sent.arcs() {
                for code in extractor.codes(&sent, h, m, label) {
                    let decoded = extractor.codec().decode(code, true).unwrap();
                    prop_assert_eq!(decoded.label, label);
                    if let Some(indices) = encoder.harvest_indices(&decoded, &layout) {
                        prop_assert_eq!(indices.len(), layout.len());
                        for (id, index) in indices.iter().enumerate() {
                            if let Some(index) = index {
                                let size: usize = encoder.kinds(layout.node(id).role).iter().sum();
                                prop_assert!(*index < size);
                            }
                        }
                    }
                }
            }
        }
    }
}
