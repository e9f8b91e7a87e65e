//! # tenparse-train
//!
//! Training and parsing around the tensor arc scorer.
//!
//! This crate provides:
//! - CoNLL-U reading and writing ([`conll`])
//! - Projective first-order decoding with loss augmentation ([`EisnerDecoder`])
//! - The hashed flat arc model used for pretraining and mixing ([`FlatModel`])
//! - Online AdaGrad/MIRA training with a decomposition warm start ([`Trainer`])
//! - UAS/LAS/CAS evaluation ([`Evaluator`])
//! - Whole-model save and load ([`persist`])
//! - A `tracing-subscriber` bootstrap ([`logging`]), used by the
//!   `train_parser` example
//!
//! ## Quick Start
//!
//! ```
//! use tenparse_core::ParserConfig;
//! use tenparse_features::Sentence;
//! use tenparse_train::{Model, Trainer};
//!
//! let corpus = vec![
//!     Sentence::from_tokens("en", &[("dog", "NOUN", 2, "nsubj"), ("barks", "VERB", 0, "root")]),
//!     Sentence::from_tokens("en", &[("cats", "NOUN", 2, "nsubj"), ("sleep", "VERB", 0, "root")]),
//! ];
//! let config = ParserConfig::multiway()
//!     .rank(4)
//!     .gamma(0.5)
//!     .max_iters(2)
//!     .hash_buckets(1 << 16);
//! let (mut model, encoded) = Model::build(config, &corpus, None, None)?;
//!
//! let mut trainer = Trainer::default();
//! let report = trainer.train(&mut model, &encoded, Some(&corpus))?;
//! assert_eq!(report.epochs.len(), 2);
//! # Ok::<(), anyhow::Error>(())
//! ```

#![deny(warnings)]

pub mod conll;
pub mod decoder;
pub mod eval;
pub mod flat;
pub mod logging;
pub mod model;
pub mod persist;
pub mod trainer;

#[cfg(test)]
mod property_tests;

pub use conll::{read_conll, read_conll_file, write_conll, write_conll_file};
pub use decoder::{ArcScores, DependencyDecoder, EisnerDecoder};
pub use eval::{EvalScores, Evaluator};
pub use flat::{FlatModel, HarvestStats};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use model::{ArcScorer, Model, Parse};
pub use trainer::{EpochStats, PretrainReport, TrainReport, Trainer};
