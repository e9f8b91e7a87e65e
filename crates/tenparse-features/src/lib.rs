//! # tenparse-features
//!
//! Everything that turns a sentence into the sparse vectors the parameter tree
//! reads.
//!
//! - **Alphabets** ([`Vocabulary`]) for tags and labels, with the reserved
//!   root, start, end and unknown tags at fixed ids
//! - **Typology** ([`Typology`]) of per-language word-order features, language
//!   classes and families
//! - **Embeddings** ([`Embeddings`]) for the optional lexical leaves
//! - **Distance buckets** ([`binned_distance`]) shared by every template
//! - **Feature encoder** ([`FeatureEncoder`]), the [`FeatureSchema`] of the
//!   tensor tree
//! - **Flat arc templates** ([`ArcFeatureExtractor`], [`ArcCodec`]) and their
//!   placement in the tensor tree for decomposition
//!
//! ## Quick Start
//!
//! ```
//! use tenparse_core::{ParserConfig, TreeShape};
//! use tenparse_features::{FeatureEncoder, Sentence, Vocabulary};
//!
//! let sentence = Sentence::from_tokens("en", &[("dog", "NOUN", 2, "nsubj"), ("barks", "VERB", 0, "root")]);
//! let vocab = Vocabulary::build(&[sentence.clone()]);
//! let config = ParserConfig::multiway().rank(4);
//! let encoder = FeatureEncoder::new(&config, vocab, None, None)?;
//!
//! let shape = TreeShape::build(&config, &encoder)?;
//! let sent = encoder.encode(&sentence)?;
//! assert_eq!(sent.head(1), Some(2));
//! assert_eq!(shape.roles().len(), 6);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! [`FeatureSchema`]: tenparse_core::FeatureSchema

#![deny(warnings)]

pub mod alphabet;
pub mod distance;
pub mod embeddings;
pub mod encoder;
pub mod error;
pub mod harvest;
pub mod hashing;
pub mod instance;
pub mod rules;
pub mod typology;

#[cfg(test)]
mod property_tests;

pub use alphabet::{Alphabet, LabelClass, TagClass, Vocabulary};
pub use distance::{arc_bin, binned_distance, magnitude_bin, DIRECTED_BINS, MAX_DISTANCE};
pub use embeddings::Embeddings;
pub use encoder::{Dependence, FeatureDims, FeatureEncoder};
pub use error::{FeatureError, FeatureResult};
pub use hashing::{
    bucket, hash_code, ArcCode, ArcCodec, ArcFeatureExtractor, ArcTemplate, TagPart,
    TemplateFamily,
};
pub use instance::{EncodedSentence, Sentence};
pub use rules::{SelectiveRule, SvoRule};
pub use typology::{LanguageTypology, TypoFeature, Typology};
