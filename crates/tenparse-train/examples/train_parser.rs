//! Train, save, reload and evaluate a parser
//!
//! This example demonstrates:
//! - Installing the tracing subscriber for a training run
//! - Training with a decomposition warm start
//! - Saving the whole model and parsing with the reloaded copy
//! - Scoring the parses against the gold trees
//!
//! Usage:
//!
//! ```text
//! cargo run --example train_parser
//! cargo run --example train_parser -- <config.json> <train.conllu> <lang> [test.conllu] [typology.txt]
//! ```
//!
//! Without arguments a small built-in English treebank is used. Set
//! `RUST_LOG=tenparse=debug` or `TENPARSE_LOG_FORMAT=json` to change the log
//! output.

use anyhow::{Context, Result};
use tenparse_core::ParserConfig;
use tenparse_features::{Sentence, Typology};
use tenparse_train::{
    init_logging, read_conll, read_conll_file, write_conll, Evaluator, LoggingConfig, Model, Trainer,
};

const DEMO: &str = "\
1\tthe\t_\tDET\t_\t_\t2\tdet\t_\t_
2\tdog\t_\tNOUN\t_\t_\t3\tnsubj\t_\t_
3\tbarks\t_\tVERB\t_\t_\t0\troot\t_\t_
4\t.\t_\tPUNCT\t_\t_\t3\tpunct\t_\t_

1\tcats\t_\tNOUN\t_\t_\t2\tnsubj\t_\t_
2\tchase\t_\tVERB\t_\t_\t0\troot\t_\t_
3\tmice\t_\tNOUN\t_\t_\t2\tobj\t_\t_
";

struct Run {
    config: ParserConfig,
    train: Vec<Sentence>,
    test: Vec<Sentence>,
    typology: Option<Typology>,
}

fn demo() -> Result<Run> {
    let train = read_conll(DEMO.as_bytes(), "en")?;
    Ok(Run {
        config: ParserConfig::multiway()
            .rank(4)
            .learn_label(true)
            .gamma(0.3)
            .pretrain(0.1, 2)
            .max_iters(5)
            .hash_buckets(1 << 18),
        test: train.clone(),
        train,
        typology: None,
    })
}

fn from_args(args: &[String]) -> Result<Run> {
    let config = ParserConfig::from_json_file(&args[0]).with_context(|| format!("reading {}", args[0]))?;
    let language = &args[2];
    let train = read_conll_file(&args[1], language)?;
    let test = match args.get(3) {
        Some(path) => read_conll_file(path, language)?,
        None => train.clone(),
    };
    let typology = args
        .get(4)
        .map(Typology::load)
        .transpose()
        .context("reading typology table")?;
    Ok(Run {
        config,
        train,
        test,
        typology,
    })
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default())?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let run = if args.len() >= 3 { from_args(&args)? } else { demo()? };
    let with_punc = run.config.eval_with_punc;
    let learn_label = run.config.learn_label;

    println!("Training on {} sentences", run.train.len());
    let (mut model, encoded) = Model::build(run.config, &run.train, run.typology, None)?;
    let mut trainer = Trainer::default();
    let report = trainer.train(&mut model, &encoded, None)?;
    for stats in &report.epochs {
        println!(
            "  epoch {}: loss {:.3}, accuracy {:.3}, {} updates",
            stats.epoch,
            stats.loss,
            stats.accuracy(),
            stats.updates
        );
    }

    let path = std::env::temp_dir().join("tenparse-example.model");
    model.save(&path)?;
    let reloaded = Model::load(&path)?;
    println!("\nSaved and reloaded the model from {}", path.display());

    let mut evaluator = Evaluator::new(with_punc, learn_label);
    let mut parsed = Vec::with_capacity(run.test.len());
    for gold in &run.test {
        let predicted = trainer.parse_sentence(&reloaded, gold)?;
        evaluator.add(gold, &predicted)?;
        parsed.push(predicted);
    }
    let scores = evaluator.scores();
    println!(
        "UAS {:.4}  LAS {:.4}  CAS {:.4}  ({} tokens)\n",
        scores.uas, scores.las, scores.cas, scores.tokens
    );

    let mut out = Vec::new();
    write_conll(&mut out, &parsed[..parsed.len().min(2)])?;
    print!("{}", String::from_utf8_lossy(&out));
    Ok(())
}
