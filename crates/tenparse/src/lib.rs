//! # tenparse
//!
//! Cross-lingual dependency parsing with a hierarchical low-rank tensor arc
//! scorer.
//!
//! This is the **meta crate** that re-exports every tenparse component.
//!
//! ## Quick Start
//!
//! ```
//! use tenparse::prelude::*;
//!
//! let corpus = read_conll(
//!     "1\tdogs\t_\tNOUN\t_\t_\t2\tnsubj\t_\t_\n2\tbark\t_\tVERB\t_\t_\t0\troot\t_\t_\n".as_bytes(),
//!     "en",
//! )?;
//! let config = ParserConfig::threeway().rank(2).gamma(0.5).max_iters(1).hash_buckets(1 << 16);
//! let (mut model, encoded) = Model::build(config, &corpus, None, None)?;
//! let mut trainer = Trainer::default();
//! trainer.train(&mut model, &encoded, None)?;
//! let parsed = trainer.parse_sentence(&model, &corpus[0])?;
//! assert_eq!(parsed.heads.len(), 3);
//! # Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
//! ```
//!
//! ## Components
//!
//! ### Parameter tree ([`core`])
//!
//! Run configuration, the shape descriptor shared by scoring and
//! decomposition, factor matrices with active masks and optimizer state, and
//! their persistence.
//!
//! ### Features ([`features`])
//!
//! Vocabularies, typology tables, embeddings, per-node feature encodings and
//! the hashed flat arc templates.
//!
//! ### Arc scoring ([`compose`])
//!
//! Per-sentence cached scoring and gradient accumulation.
//!
//! ### Warm start ([`decomp`])
//!
//! Greedy rank-by-rank power iteration from harvested flat weights.
//!
//! ### Training ([`train`])
//!
//! CoNLL-U I/O, Eisner decoding, online AdaGrad/MIRA and evaluation.
//!
//! ## Features
//!
//! - `tracing` (default): `tracing-subscriber` bootstrap for training runs
//! - `parallel`: score the sentences of a batch in parallel

#![deny(warnings)]

pub use tenparse_compose as compose;
pub use tenparse_core as core;
pub use tenparse_decomp as decomp;
pub use tenparse_features as features;
pub use tenparse_train as train;

pub mod prelude {
    //! Prelude module for convenient imports

    pub use crate::core::{ParameterNode, ParserConfig, TensorMode, TreeShape, UpdateMode};

    pub use crate::features::{Embeddings, FeatureEncoder, Sentence, Typology, Vocabulary};

    pub use crate::compose::{EncodedInstance, GradientArena, SentenceScorer};

    pub use crate::decomp::{decompose, DecompConfig, TensorEntry};

    pub use crate::train::{
        read_conll, read_conll_file, write_conll, write_conll_file, EisnerDecoder, Evaluator,
        Model, Trainer,
    };
}
