//! Sparse feature vectors
//!
//! A [`SparseFeatureVector`] is an ordered list of `(index, value)` pairs used
//! both as the one-hot/multi-hot encoding of a discrete arc property and as the
//! per-rank gradient accumulator of a parameter node.
//!
//! Duplicate indices are allowed while accumulating; [`SparseFeatureVector::aggregate`]
//! merges them (sorted by index, exact zeros dropped) before the vector is
//! consumed by an optimizer step.
//!
//! # Examples
//!
//! ```
//! use tenparse_core::SparseFeatureVector;
//!
//! let mut fv = SparseFeatureVector::new();
//! fv.push(3, 1.0);
//! fv.push(0, 1.0);
//! fv.push(3, 0.5);
//! fv.aggregate();
//!
//! assert_eq!(fv.iter().collect::<Vec<_>>(), vec![(0, 1.0), (3, 1.5)]);
//! assert_eq!(fv.dot(&[2.0, 0.0, 0.0, 4.0]), 8.0);
//! ```

use scirs2_core::ndarray_ext::ArrayView1;
use serde::{Deserialize, Serialize};

/// Ordered `(index, value)` list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseFeatureVector {
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl SparseFeatureVector {
    /// Create an empty vector
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty vector with room for `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            indices: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    /// Build from `(index, value)` pairs, keeping their order
    pub fn from_pairs<I: IntoIterator<Item = (usize, f64)>>(pairs: I) -> Self {
        let mut fv = Self::new();
        for (index, value) in pairs {
            fv.push(index, value);
        }
        fv
    }

    /// Build a binary vector (every value is 1.0)
    pub fn from_indices<I: IntoIterator<Item = usize>>(indices: I) -> Self {
        Self::from_pairs(indices.into_iter().map(|i| (i, 1.0)))
    }

    /// Append one entry
    #[inline]
    pub fn push(&mut self, index: usize, value: f64) {
        self.indices.push(index);
        self.values.push(value);
    }

    /// Append every entry of `other` scaled by `scale`
    pub fn add_scaled(&mut self, other: &SparseFeatureVector, scale: f64) {
        self.indices.extend_from_slice(&other.indices);
        self.values.extend(other.values.iter().map(|v| v * scale));
    }

    /// Number of stored entries (duplicates included)
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// True if no entries are stored
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Stored indices in insertion order
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Stored values in insertion order
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Iterate over `(index, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    /// Largest stored index
    pub fn max_index(&self) -> Option<usize> {
        self.indices.iter().copied().max()
    }

    /// Dot product with a dense row.
    ///
    /// Indices past the end of `row` contribute nothing; callers validate
    /// widths before scoring.
    #[inline]
    pub fn dot(&self, row: &[f64]) -> f64 {
        self.iter()
            .map(|(i, v)| row.get(i).map_or(0.0, |w| w * v))
            .sum()
    }

    /// Dot product with one row of a factor matrix
    #[inline]
    pub fn dot_view(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.iter()
            .map(|(i, v)| row.get(i).map_or(0.0, |w| w * v))
            .sum()
    }

    /// Sum of squared values as stored (call [`aggregate`](Self::aggregate) first
    /// to get the norm of the represented vector)
    pub fn squared_norm(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum()
    }

    /// Merge duplicate indices, sort by index, drop exact zeros
    pub fn aggregate(&mut self) {
        if self.indices.len() <= 1 {
            if self.values.first() == Some(&0.0) {
                self.clear();
            }
            return;
        }

        let mut pairs: Vec<(usize, f64)> = self.iter().collect();
        pairs.sort_by_key(|&(i, _)| i);

        self.indices.clear();
        self.values.clear();
        let mut iter = pairs.into_iter();
        if let Some((mut cur, mut acc)) = iter.next() {
            for (i, v) in iter {
                if i == cur {
                    acc += v;
                } else {
                    if acc != 0.0 {
                        self.push(cur, acc);
                    }
                    cur = i;
                    acc = v;
                }
            }
            if acc != 0.0 {
                self.push(cur, acc);
            }
        }
    }

    /// Keep only the entries whose index satisfies `keep`
    pub fn retain<F: FnMut(usize) -> bool>(&mut self, mut keep: F) {
        let mut w = 0;
        for r in 0..self.indices.len() {
            if keep(self.indices[r]) {
                self.indices[w] = self.indices[r];
                self.values[w] = self.values[r];
                w += 1;
            }
        }
        self.indices.truncate(w);
        self.values.truncate(w);
    }

    /// Remove every entry, keeping the allocation
    pub fn clear(&mut self) {
        self.indices.clear();
        self.values.clear();
    }
}

impl FromIterator<(usize, f64)> for SparseFeatureVector {
    fn from_iter<I: IntoIterator<Item = (usize, f64)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}
