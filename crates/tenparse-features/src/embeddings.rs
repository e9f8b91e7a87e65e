//! Word embeddings for the lexical leaves
//!
//! Text format, one word per line: `word v1 v2 ... vE`. An optional
//! `count dim` header line is skipped. Lookups fall back to the lowercased
//! form.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tenparse_core::SparseFeatureVector;

use crate::error::{FeatureError, FeatureResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embeddings {
    dim: usize,
    index: HashMap<String, usize>,
    values: Vec<f64>,
}

impl Embeddings {
    pub fn parse(text: &str) -> FeatureResult<Self> {
        let mut dim = 0;
        let mut index = HashMap::new();
        let mut values = Vec::new();

        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let word = fields.next().unwrap_or_default();
            let row: Vec<f64> = fields
                .map(str::parse)
                .collect::<Result<_, _>>()
                .map_err(|e| FeatureError::Embedding {
                    line: i + 1,
                    message: format!("{}", e),
                })?;

            if i == 0 && row.len() == 1 && word.parse::<usize>().is_ok() {
                continue;
            }
            if dim == 0 {
                dim = row.len();
            }
            if row.is_empty() || row.len() != dim {
                return Err(FeatureError::Embedding {
                    line: i + 1,
                    message: format!("expected {} values, got {}", dim, row.len()),
                });
            }
            if index.contains_key(word) {
                continue;
            }
            index.insert(word.to_string(), index.len());
            values.extend(row);
        }

        Ok(Self { dim, index, values })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> FeatureResult<Self> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Row of `word`, trying the lowercased form second
    pub fn lookup(&self, word: &str) -> Option<usize> {
        self.index
            .get(word)
            .or_else(|| self.index.get(&word.to_lowercase()))
            .copied()
    }

    pub fn vector(&self, row: usize) -> &[f64] {
        &self.values[row * self.dim..(row + 1) * self.dim]
    }

    /// Lexical feature vector: bias at 0, embedding values at `1..=E`
    pub fn features(&self, row: Option<usize>) -> SparseFeatureVector {
        let mut fv = SparseFeatureVector::with_capacity(self.dim + 1);
        fv.push(0, 1.0);
        if let Some(row) = row {
            for (k, &v) in self.vector(row).iter().enumerate() {
                if v != 0.0 {
                    fv.push(k + 1, v);
                }
            }
        }
        fv
    }
}
