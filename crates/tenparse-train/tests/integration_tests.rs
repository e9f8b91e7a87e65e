//! Integration tests for training and parsing
//!
//! These tests build models over small treebanks, run the warm start and the
//! online updates in every update mode, and parse and evaluate the result.

use tenparse_compose::GradientArena;
use tenparse_core::{ParserConfig, UpdateMode};
use tenparse_features::{Sentence, Typology};
use tenparse_train::{
    read_conll, write_conll, ArcScorer, DependencyDecoder, EisnerDecoder, Evaluator, Model, Trainer,
};

const TABLE: &str = "\
3 5 2
2 2 2 2 2
en 0 0 0 1 0 0
de 0 1 0 0 0 0 7
ja 1 1 1 0 1 1
";

const TREEBANK: &str = "\
# sent_id = 1
1\tthe\tthe\tDET\t_\t_\t2\tdet\t_\t_
2\tdog\tdog\tNOUN\t_\t_\t3\tnsubj\t_\t_
3\tbarks\tbark\tVERB\t_\t_\t0\troot\t_\t_
4\t.\t.\tPUNCT\t_\t_\t3\tpunct\t_\t_

1\tcats\tcat\tNOUN\t_\t_\t2\tnsubj\t_\t_
2\tchase\tchase\tVERB\t_\t_\t0\troot\t_\t_
3\tmice\tmouse\tNOUN\t_\t_\t2\tobj\t_\t_

1\tbirds\tbird\tNOUN\t_\t_\t2\tnsubj\t_\t_
2\tsing\tsing\tVERB\t_\t_\t0\troot\t_\t_
3\tin\tin\tADP\t_\t_\t4\tcase\t_\t_
4\ttrees\ttree\tNOUN\t_\t_\t2\tobl\t_\t_
";

fn english() -> Vec<Sentence> {
    read_conll(TREEBANK.as_bytes(), "en").unwrap()
}

fn bilingual() -> Vec<Sentence> {
    let mut corpus = english();
    corpus.push(Sentence::from_tokens(
        "de",
        &[
            ("der", "DET", 2, "det"),
            ("Hund", "NOUN", 3, "nsubj"),
            ("bellt", "VERB", 0, "root"),
            ("laut", "ADV", 3, "advmod"),
        ],
    ));
    corpus
}

#[test]
fn test_read_treebank() {
    let corpus = english();
    assert_eq!(corpus.len(), 3);
    assert_eq!(corpus[2].heads, vec![-1, 2, 0, 4, 2]);
}

#[test]
fn test_flat_model_learns_a_sentence() {
    let corpus = vec![english().swap_remove(1)];
    let config = ParserConfig::multiway()
        .rank(2)
        .gamma(1.0)
        .ada_grad(0.5, 1e-5)
        .max_iters(20)
        .hash_buckets(1 << 20);
    let (mut model, encoded) = Model::build(config, &corpus, None, None).unwrap();

    let mut trainer = Trainer::default();
    let report = trainer.train(&mut model, &encoded, Some(&corpus)).unwrap();
    assert!(report.pretrain.is_none());
    assert_eq!(report.epochs.len(), 20);
    assert_eq!(report.epochs[0].total, 3);
    assert_eq!(report.dev.last().unwrap().uas, 1.0);
    assert_eq!(report.epochs.last().unwrap().updates, 0);
}

#[test]
fn test_gold_against_gold_gives_no_update() {
    let corpus = vec![Sentence::from_tokens(
        "en",
        &[("dogs", "NOUN", 2, "nsubj"), ("bark", "VERB", 0, "root"), ("loudly", "ADV", 2, "advmod")],
    )];
    let config = ParserConfig::multiway()
        .rank(3)
        .learn_label(true)
        .gamma(0.5)
        .hash_buckets(1 << 16);
    let (model, encoded) = Model::build(config, &corpus, None, None).unwrap();
    let sent = &encoded[0];

    let mut arena = GradientArena::new(&model.tree);
    let mut scorer = model.scorer(sent).unwrap();
    let flat = scorer
        .add_difference((&sent.heads, &sent.labels), (&sent.heads, &sent.labels), &mut arena)
        .unwrap();
    assert!(flat.is_empty());
    assert!(arena.is_empty());
    assert_eq!(arena.squared_norm(), 0.0);
}

#[test]
fn test_multiway_adagrad_with_warm_start() {
    let corpus = english();
    let config = ParserConfig::multiway()
        .rank(4)
        .learn_label(true)
        .gamma(0.3)
        .ada_grad(0.05, 1e-5)
        .pretrain(0.1, 2)
        .max_iters(3)
        .batch_size(2)
        .hash_buckets(1 << 18)
        .decomposition(200, 1e-6);
    let (mut model, encoded) = Model::build(config, &corpus, None, None).unwrap();

    let mut trainer = Trainer::default();
    let report = trainer.train(&mut model, &encoded, Some(&corpus)).unwrap();

    let pretrain = report.pretrain.unwrap();
    assert_eq!(pretrain.epochs.len(), 2);
    assert!(pretrain.harvest.entries > 0);
    assert_eq!(pretrain.skipped, 0);
    assert_eq!(pretrain.decomposition.ranks.len(), 4);

    assert_eq!(report.epochs.len(), 3);
    for stats in &report.epochs {
        // 3 sentences in batches of 2
        assert!(stats.updates <= 2);
        assert_eq!(stats.total, 11);
        assert!(stats.loss.is_finite());
    }
    for scores in &report.dev {
        assert!((0.0..=1.0).contains(&scores.uas));
        assert!(scores.las <= scores.uas);
        assert_eq!(scores.sentences, 3);
    }
}

#[test]
fn test_hierarchical_mira_with_typology() {
    let corpus = bilingual();
    let config = ParserConfig::hierarchical()
        .rank(3)
        .learn_label(true)
        .gamma(0.5)
        .update_mode(UpdateMode::Mira)
        .mira_c(1.0)
        .average(true)
        .pretrain(0.1, 1)
        .max_iters(2)
        .hash_buckets(1 << 18)
        .decomposition(100, 1e-6);
    let typology = Typology::parse(TABLE).unwrap();
    let (mut model, encoded) = Model::build(config, &corpus, Some(typology), None).unwrap();

    let mut trainer = Trainer::default();
    let report = trainer.train(&mut model, &encoded, Some(&corpus)).unwrap();
    assert!(report.pretrain.is_some());
    assert_eq!(report.dev.len(), 2);
    assert!(trainer.update_count() > 0);
    assert!(!model.tree.is_averaged());

    let parsed = trainer.parse_sentence(&model, &corpus[3]).unwrap();
    assert_eq!(parsed.len(), corpus[3].len());
    assert_eq!(parsed.language, "de");
    assert!(parsed.heads[1..].iter().all(|&h| h >= 0));
}

#[test]
fn test_hierarchical_requires_typology() {
    let config = ParserConfig::hierarchical().rank(2);
    assert!(Model::build(config, &english(), None, None).is_err());
}

#[test]
fn test_pretrain_resets_flat_model_and_count() {
    let corpus = english();
    let config = ParserConfig::threeway()
        .rank(2)
        .gamma(0.5)
        .update_mode(UpdateMode::Mira)
        .pretrain(0.1, 2)
        .hash_buckets(1 << 16)
        .decomposition(50, 1e-6);
    let (mut model, encoded) = Model::build(config, &corpus, None, None).unwrap();
    let codes = model.flat.codes().len();

    let mut trainer = Trainer::default();
    let report = trainer.pretrain(&mut model, &encoded).unwrap();
    assert!(report.epochs.iter().any(|e| e.updates > 0));
    assert_eq!(model.flat.touched(), 0);
    assert_eq!(model.flat.codes().len(), codes);
    assert_eq!(trainer.update_count(), 0);

    let stats = trainer.epoch(&mut model, &encoded, 1).unwrap();
    assert_eq!(trainer.update_count(), stats.updates);
}

#[test]
fn test_tensor_only_scores_ignore_flat_weights() {
    let corpus = english();
    let config = ParserConfig::multiway().rank(2).gamma(0.0).hash_buckets(1 << 16);
    let (model, encoded) = Model::build(config, &corpus, None, None).unwrap();
    let sent = &encoded[0];

    let mut scorer = ArcScorer::new(&model, sent, 0.0).unwrap();
    let scores = scorer.arc_scores().unwrap();
    let heads = EisnerDecoder.decode(&scores, None).unwrap();
    let parse = model.parse(sent, &EisnerDecoder).unwrap();
    assert_eq!(parse.heads, heads);
    assert!(parse.labels.iter().all(Option::is_none));
}

#[test]
fn test_parse_write_and_evaluate() {
    let corpus = english();
    let config = ParserConfig::threeway()
        .rank(2)
        .learn_label(true)
        .gamma(0.5)
        .no_pretrain()
        .max_iters(1)
        .hash_buckets(1 << 16);
    let (mut model, encoded) = Model::build(config, &corpus, None, None).unwrap();
    let mut trainer = Trainer::default();
    trainer.train(&mut model, &encoded, None).unwrap();

    let parsed: Vec<Sentence> = corpus
        .iter()
        .map(|s| trainer.parse_sentence(&model, s).unwrap())
        .collect();
    let mut out = Vec::new();
    write_conll(&mut out, &parsed).unwrap();
    let reread = read_conll(out.as_slice(), "en").unwrap();
    assert_eq!(reread, parsed);

    let mut evaluator = Evaluator::new(false, true);
    for (gold, predicted) in corpus.iter().zip(&reread) {
        evaluator.add(gold, predicted).unwrap();
    }
    let scores = evaluator.scores();
    // the final period is punctuation
    assert_eq!(scores.tokens, 10);
    assert_eq!(scores, trainer.evaluate(&mut model, &corpus).unwrap());
}

#[test]
fn test_saved_model_parses_without_training_data() {
    let corpus = bilingual();
    let config = ParserConfig::hierarchical()
        .rank(3)
        .learn_label(true)
        .gamma(0.4)
        .no_pretrain()
        .max_iters(2)
        .hash_buckets(1 << 16);
    let typology = Typology::parse(TABLE).unwrap();
    let (mut model, encoded) = Model::build(config, &corpus, Some(typology), None).unwrap();
    let mut trainer = Trainer::default();
    trainer.train(&mut model, &encoded, None).unwrap();
    assert!(model.flat.touched() > 0);

    let path = std::env::temp_dir().join(format!("tenparse-model-{}.bin", std::process::id()));
    model.save(&path).unwrap();
    let reloaded = Model::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    for sentence in &corpus {
        let sent = model.encode(sentence).unwrap();
        let again = reloaded.encode(sentence).unwrap();
        assert_eq!(again, sent);
        let expected = model.scorer(&sent).unwrap().arc_scores().unwrap();
        let scores = reloaded.scorer(&again).unwrap().arc_scores().unwrap();
        assert_eq!(scores, expected);
        assert_eq!(
            trainer.parse_sentence(&reloaded, sentence).unwrap(),
            trainer.parse_sentence(&model, sentence).unwrap()
        );
    }
}

#[test]
fn test_load_rejects_other_files() {
    assert!(Model::from_bytes(b"TNPM\x01\x00\x00\x00").is_err());
    assert!(Model::from_bytes(b"").is_err());
}
