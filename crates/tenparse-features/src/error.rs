//! Error types for feature encoding
//!
//! Parse errors carry the source line so a broken typology or embedding file
//! can be fixed by hand. Codec errors indicate that the configured alphabets
//! do not fit the 64-bit arc code.

use thiserror::Error;

use tenparse_core::TensorError;

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("Typology parse error at line {line}: {message}")]
    Typology { line: usize, message: String },

    #[error("Embedding parse error at line {line}: {message}")]
    Embedding { line: usize, message: String },

    #[error("Unknown language: {0}")]
    UnknownLanguage(String),

    #[error("Tensor mode {0} needs a typology table")]
    MissingTypology(String),

    #[error("Lexical leaves need word embeddings")]
    MissingEmbeddings,

    #[error("Unknown arc template ordinal: {0}")]
    UnknownTemplate(u64),

    #[error("Arc code needs {bits} bits, only 64 are available")]
    CodecOverflow { bits: u32 },

    #[error("Malformed arc code {code:#x}: {message}")]
    MalformedCode { code: u64, message: String },

    #[error("Sentence has {found} tokens in column {column}, expected {expected}")]
    RaggedSentence {
        column: &'static str,
        expected: usize,
        found: usize,
    },

    #[error(transparent)]
    Tensor(#[from] TensorError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type FeatureResult<T> = std::result::Result<T, FeatureError>;
