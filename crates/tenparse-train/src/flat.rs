//! Hashed first-order arc model
//!
//! Weights live in `hash_buckets` buckets of which only the touched ones are
//! stored. Besides the weights the model keeps the set of arc codes seen on
//! gold trees during preprocessing. The set is frozen before training, and
//! [`FlatModel::harvest`] decodes its codes back into tensor coordinates so
//! the trained weights can warm-start the low-rank tensor.

use std::collections::{BTreeSet, HashMap};

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use tenparse_core::{SparseFeatureVector, TreeLayout, UpdateMode};
use tenparse_decomp::TensorEntry;
use tenparse_features::{bucket, ArcFeatureExtractor, EncodedSentence, FeatureEncoder};

/// Weights below this magnitude are not harvested
const HARVEST_THRESHOLD: f64 = 1e-8;

/// Optimizer state of the flat weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum FlatOptimizer {
    AdaGrad {
        sum_squares: HashMap<usize, f64>,
    },
    Mira {
        margin_bound: f64,
        running_total: HashMap<usize, f64>,
        backup: Option<HashMap<usize, f64>>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatModel {
    buckets: usize,
    weights: HashMap<usize, f64>,
    optimizer: FlatOptimizer,
    codes: BTreeSet<u64>,
    frozen: bool,
}

/// Counts of one harvest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestStats {
    /// Codes with a non-zero weight
    pub weighted: usize,
    /// Codes the tensor mode has no place for
    pub unplaced: usize,
    pub entries: usize,
}

impl FlatModel {
    pub fn new(buckets: usize, update_mode: UpdateMode, margin_bound: f64) -> Self {
        let optimizer = match update_mode {
            UpdateMode::AdaGrad => FlatOptimizer::AdaGrad {
                sum_squares: HashMap::new(),
            },
            UpdateMode::Mira => FlatOptimizer::Mira {
                margin_bound,
                running_total: HashMap::new(),
                backup: None,
            },
        };
        Self {
            buckets,
            weights: HashMap::new(),
            optimizer,
            codes: BTreeSet::new(),
            frozen: false,
        }
    }

    pub fn buckets(&self) -> usize {
        self.buckets
    }

    /// Number of buckets with a stored weight
    pub fn touched(&self) -> usize {
        self.weights.len()
    }

    pub fn weight(&self, bucket: usize) -> f64 {
        self.weights.get(&bucket).copied().unwrap_or(0.0)
    }

    pub fn codes(&self) -> &BTreeSet<u64> {
        &self.codes
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Record the codes of every gold arc of `sent`, labeled copies included
    /// when `learn_label`
    pub fn record_gold(&mut self, extractor: &ArcFeatureExtractor<'_>, sent: &EncodedSentence, learn_label: bool) -> Result<()> {
        ensure!(!self.frozen, "the code set is frozen");
        for (h, m, label) in sent.arcs() {
            self.codes.extend(extractor.codes(sent, h, m, None));
            if let (true, Some(l)) = (learn_label, label) {
                self.codes.extend(extractor.codes(sent, h, m, Some(l)));
            }
        }
        Ok(())
    }

    /// Stop growing the code set
    pub fn freeze(&mut self) {
        self.frozen = true;
        log::debug!("froze {} gold arc codes", self.codes.len());
    }

    pub fn score(&self, fv: &SparseFeatureVector) -> f64 {
        fv.iter().map(|(i, v)| self.weight(i) * v).sum()
    }

    /// AdaGrad step on the ascent direction `gradient`
    pub fn apply_adagrad(&mut self, gradient: &SparseFeatureVector, learning_rate: f64, epsilon: f64) -> Result<()> {
        let FlatOptimizer::AdaGrad { sum_squares } = &mut self.optimizer else {
            anyhow::bail!("flat model carries MIRA state, AdaGrad step requested");
        };
        let mut merged = gradient.clone();
        merged.aggregate();
        for (i, g) in merged.iter() {
            let s = sum_squares.entry(i).or_insert(0.0);
            *s += g * g;
            *self.weights.entry(i).or_insert(0.0) += learning_rate / (*s + epsilon).sqrt() * g;
        }
        Ok(())
    }

    /// MIRA step `min(step_size, C)·gradient`; `update_count` weights the
    /// running total for averaging
    pub fn apply_mira(&mut self, gradient: &SparseFeatureVector, step_size: f64, update_count: usize) -> Result<()> {
        let FlatOptimizer::Mira {
            margin_bound,
            running_total,
            backup,
        } = &mut self.optimizer
        else {
            anyhow::bail!("flat model carries AdaGrad state, MIRA step requested");
        };
        ensure!(backup.is_none(), "MIRA step while averaged weights are swapped in");

        let step = step_size.min(*margin_bound);
        let mut merged = gradient.clone();
        merged.aggregate();
        for (i, g) in merged.iter() {
            *self.weights.entry(i).or_insert(0.0) += step * g;
            *running_total.entry(i).or_insert(0.0) += step * update_count as f64 * g;
        }
        Ok(())
    }

    /// Swap in `(w·(T+1) − total) / T`
    pub fn average_for_evaluation(&mut self, update_count: usize) -> Result<()> {
        let FlatOptimizer::Mira {
            running_total,
            backup,
            ..
        } = &mut self.optimizer
        else {
            anyhow::bail!("averaging requires MIRA state");
        };
        ensure!(backup.is_none(), "weights are already averaged");

        let training = self.weights.clone();
        if update_count > 0 {
            let t = update_count as f64;
            for (i, w) in self.weights.iter_mut() {
                *w = (*w * (t + 1.0) - running_total.get(i).copied().unwrap_or(0.0)) / t;
            }
        }
        *backup = Some(training);
        Ok(())
    }

    pub fn restore_training(&mut self) -> Result<()> {
        let FlatOptimizer::Mira { backup, .. } = &mut self.optimizer else {
            anyhow::bail!("averaging requires MIRA state");
        };
        match backup.take() {
            Some(training) => {
                self.weights = training;
                Ok(())
            }
            None => anyhow::bail!("restore requested without averaged weights"),
        }
    }

    /// Drop weights and optimizer state; the code set stays
    pub fn clear_weights(&mut self) {
        self.weights.clear();
        match &mut self.optimizer {
            FlatOptimizer::AdaGrad { sum_squares } => sum_squares.clear(),
            FlatOptimizer::Mira {
                running_total,
                backup,
                ..
            } => {
                running_total.clear();
                *backup = None;
            }
        }
    }

    /// Tensor entries of every recorded code with a non-zero weight.
    ///
    /// Codes share their bucket's weight. Codes the tensor mode of `encoder`
    /// cannot place are counted and skipped.
    pub fn harvest(&self, encoder: &FeatureEncoder, extractor: &ArcFeatureExtractor<'_>, layout: &TreeLayout) -> Result<(Vec<TensorEntry>, HarvestStats)> {
        let mut stats = HarvestStats::default();
        let mut entries = Vec::new();
        for &code in &self.codes {
            let value = self.weight(bucket(code, self.buckets));
            if value.abs() <= HARVEST_THRESHOLD {
                continue;
            }
            stats.weighted += 1;
            let decoded = extractor.codec().decode(code, encoder.typed())?;
            match encoder.harvest_indices(&decoded, layout) {
                Some(coords) => entries.push(TensorEntry::new(coords, value)),
                None => stats.unplaced += 1,
            }
        }
        stats.entries = entries.len();
        Ok((entries, stats))
    }
}
