//! # tenparse-compose
//!
//! Per-sentence composition engine of the tensor arc scorer.
//!
//! A [`SentenceScorer`] caches `W·fv` for every distinct value each node of the
//! parameter tree takes in one sentence, then scores arcs and accumulates their
//! gradients by walking the tree over length-`R` vectors. Gradients go into a
//! [`GradientArena`] that is drained into the tree before an optimizer step.
//!
//! ## Quick Start
//!
//! ```
//! use tenparse_compose::{GradientArena, SentenceScorer, EncodedInstance};
//! use tenparse_core::{OptimizerKind, ParameterNode, ParserConfig, TreeShape};
//! use tenparse_features::{FeatureEncoder, Sentence, Vocabulary};
//! use scirs2_core::random::{rngs::StdRng, SeedableRng};
//!
//! let sentence = Sentence::from_tokens("en", &[("dog", "NOUN", 2, "nsubj"), ("barks", "VERB", 0, "root")]);
//! let config = ParserConfig::multiway().rank(4);
//! let encoder = FeatureEncoder::new(&config, Vocabulary::build(&[sentence.clone()]), None, None)?;
//! let mut tree = ParameterNode::from_shape(
//!     &TreeShape::build(&config, &encoder)?,
//!     OptimizerKind::from_config(&config),
//! )?;
//! let sent = encoder.encode(&sentence)?;
//! encoder.mark_instance(&mut tree, &sent)?;
//! tree.random_init(1.0, &mut StdRng::seed_from_u64(0));
//!
//! let mut arena = GradientArena::new(&tree);
//! let mut scorer = SentenceScorer::new(&tree, EncodedInstance::new(&encoder, &sent))?;
//! let score = scorer.score(2, 1, None)?;
//! assert_eq!(scorer.add_gradient(2, 1, None, 1.0, &mut arena)?, score);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(warnings)]

pub mod arena;
pub mod cache;
pub mod gradcheck;
pub mod scorer;
pub mod source;

#[cfg(test)]
mod property_tests;

pub use arena::GradientArena;
pub use cache::{CacheEntry, NodeCache};
pub use gradcheck::{check_entry, ArcProbe, FactorEntry, GradCheckConfig, GradCheckResult};
pub use scorer::{ScorerOptions, SentenceScorer};
pub use source::{EncodedInstance, FeatureSource};
