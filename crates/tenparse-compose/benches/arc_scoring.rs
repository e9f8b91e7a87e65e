//! Benchmarks for arc scoring
//!
//! Measures cache construction for a sentence, scoring all `n²` arcs and the
//! gradient walk of a gold tree, for every tensor mode.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use scirs2_core::random::{rngs::StdRng, SeedableRng};
use std::hint::black_box;
use tenparse_compose::{EncodedInstance, GradientArena, SentenceScorer};
use tenparse_core::{OptimizerKind, ParameterNode, ParserConfig, TensorMode, TreeShape};
use tenparse_features::{EncodedSentence, FeatureEncoder, Sentence, Typology, Vocabulary};

const TABLE: &str = "\
1 5 1
2 2 2 2 2
en 0 0 0 1 0 0
";

const TAGS: [&str; 6] = ["NOUN", "VERB", "ADJ", "DET", "ADP", "ADV"];

fn sentence(len: usize) -> Sentence {
    let tokens: Vec<(String, &str, i32, &str)> = (1..=len)
        .map(|i| {
            let head = if i == 1 { 0 } else { (i / 2) as i32 };
            (format!("w{}", i), TAGS[i % TAGS.len()], head, if i == 1 { "root" } else { "dep" })
        })
        .collect();
    let borrowed: Vec<(&str, &str, i32, &str)> = tokens
        .iter()
        .map(|(w, t, h, l)| (w.as_str(), *t, *h, *l))
        .collect();
    Sentence::from_tokens("en", &borrowed)
}

fn setup(mode: TensorMode, len: usize) -> (FeatureEncoder, ParameterNode, EncodedSentence) {
    let config = ParserConfig::default()
        .tensor_mode(mode)
        .rank(50)
        .learn_label(true);
    let raw = sentence(len);
    let encoder = FeatureEncoder::new(
        &config,
        Vocabulary::build([&raw]),
        Some(Typology::parse(TABLE).unwrap()),
        None,
    )
    .unwrap();
    let shape = TreeShape::build(&config, &encoder).unwrap();
    let mut tree = ParameterNode::from_shape(&shape, OptimizerKind::from_config(&config)).unwrap();
    let sent = encoder.encode(&raw).unwrap();
    encoder.mark_instance(&mut tree, &sent).unwrap();
    tree.random_init(1.0, &mut StdRng::seed_from_u64(17));
    (encoder, tree, sent)
}

const MODES: [TensorMode; 4] = [
    TensorMode::Threeway,
    TensorMode::Multiway,
    TensorMode::Hierarchical,
    TensorMode::ExtendedMultiway,
];

fn bench_build_caches(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_caches");

    for mode in MODES {
        let (encoder, tree, sent) = setup(mode, 30);
        group.bench_with_input(BenchmarkId::from_parameter(format!("{:?}", mode)), &mode, |b, _| {
            b.iter(|| {
                let scorer = SentenceScorer::new(&tree, EncodedInstance::new(&encoder, &sent)).unwrap();
                black_box(scorer.len())
            })
        });
    }

    group.finish();
}

fn bench_score_all_arcs(c: &mut Criterion) {
    let mut group = c.benchmark_group("score_all_arcs");

    for mode in MODES {
        for &len in &[10, 30] {
            let (encoder, tree, sent) = setup(mode, len);
            let n = sent.len();
            group.throughput(Throughput::Elements((n * (n - 1)) as u64));
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", mode), len),
                &len,
                |b, _| {
                    let mut scorer = SentenceScorer::new(&tree, EncodedInstance::new(&encoder, &sent)).unwrap();
                    b.iter(|| {
                        let mut total = 0.0;
                        for h in 0..n {
                            for m in 1..n {
                                if h != m {
                                    total += scorer.score(h, m, None).unwrap();
                                }
                            }
                        }
                        black_box(total)
                    })
                },
            );
        }
    }

    group.finish();
}

fn bench_gold_gradient(c: &mut Criterion) {
    let mut group = c.benchmark_group("gold_gradient");

    for mode in MODES {
        let (encoder, tree, sent) = setup(mode, 30);
        group.bench_with_input(BenchmarkId::from_parameter(format!("{:?}", mode)), &mode, |b, _| {
            let mut scorer = SentenceScorer::new(&tree, EncodedInstance::new(&encoder, &sent)).unwrap();
            let mut arena = GradientArena::new(&tree);
            b.iter(|| {
                for (h, m, label) in sent.arcs() {
                    scorer.add_gradient(h, m, label, 1.0, &mut arena).unwrap();
                }
                arena.clear();
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_build_caches, bench_score_all_arcs, bench_gold_gradient);
criterion_main!(benches);
