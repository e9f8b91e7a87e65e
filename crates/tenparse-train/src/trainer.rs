//! Online training
//!
//! Every sentence is decoded with Hamming loss augmentation against the
//! current parameters. When the augmented prediction scores at least as high
//! as the gold tree (`loss = hamming + S(pred) − S(gold) > 0`) the difference
//! of the two trees becomes the update direction of both the tensor and the
//! flat model.
//!
//! With `pretrain`, the flat model is first trained alone, its weights are
//! harvested and decomposed into the tensor, and the flat model is cleared.
//!
//! A batch is scored against fixed parameters, optionally in parallel, and
//! produces one optimizer step.

use anyhow::{Context, Result};
use tenparse_compose::GradientArena;
use tenparse_core::{SparseFeatureVector, UpdateMode};
use tenparse_decomp::{decompose, DecompConfig, DecompReport};
use tenparse_features::{ArcFeatureExtractor, EncodedSentence, Sentence};
use tracing::{debug, info, info_span, warn};

#[cfg(feature = "parallel")]
use scirs2_core::parallel_ops::*;

use crate::decoder::{DependencyDecoder, EisnerDecoder};
use crate::eval::{EvalScores, Evaluator};
use crate::flat::HarvestStats;
use crate::model::{ArcScorer, Model};

/// Totals of one pass over the training data
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EpochStats {
    pub epoch: usize,
    /// Sum of positive losses
    pub loss: f64,
    /// Tokens whose loss-augmented head was the gold head
    pub correct: usize,
    pub total: usize,
    /// Optimizer steps taken
    pub updates: usize,
}

impl EpochStats {
    pub fn accuracy(&self) -> f64 {
        self.correct as f64 / (self.total as f64 + 1e-20)
    }
}

/// What happened during the warm start
#[derive(Debug, Clone, PartialEq)]
pub struct PretrainReport {
    pub epochs: Vec<EpochStats>,
    pub harvest: HarvestStats,
    /// Harvested entries dropped because they name inactive indices
    pub skipped: usize,
    pub decomposition: DecompReport,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainReport {
    pub pretrain: Option<PretrainReport>,
    pub epochs: Vec<EpochStats>,
    /// Development scores after every epoch
    pub dev: Vec<EvalScores>,
}

/// Mixing weight and learning rate of one training phase
#[derive(Debug, Clone, Copy)]
struct Phase {
    gamma: f64,
    learning_rate: f64,
}

/// Update direction of one sentence
struct Gradient {
    arena: GradientArena,
    flat: SparseFeatureVector,
}

/// Result of decoding one training sentence
struct Outcome {
    loss: f64,
    correct: usize,
    total: usize,
    gradient: Option<Gradient>,
}

pub struct Trainer<D: DependencyDecoder = EisnerDecoder> {
    decoder: D,
    /// MIRA update count `T`
    update_count: usize,
}

impl Default for Trainer<EisnerDecoder> {
    fn default() -> Self {
        Self::new(EisnerDecoder)
    }
}

impl<D: DependencyDecoder + Sync> Trainer<D> {
    pub fn new(decoder: D) -> Self {
        Self {
            decoder,
            update_count: 0,
        }
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn update_count(&self) -> usize {
        self.update_count
    }

    /// Full run: optional warm start, `max_iters` epochs, and a development
    /// evaluation after every epoch when `dev` is given
    pub fn train(&mut self, model: &mut Model, train: &[EncodedSentence], dev: Option<&[Sentence]>) -> Result<TrainReport> {
        let mut report = TrainReport::default();
        if model.config.pretrain && model.config.uses_tensor() {
            report.pretrain = Some(self.pretrain(model, train).context("pretraining failed")?);
        }

        let phase = Phase {
            gamma: model.config.gamma,
            learning_rate: model.config.ada_alpha,
        };
        for epoch in 1..=model.config.max_iters {
            let span = info_span!("epoch", epoch);
            let _enter = span.enter();

            let stats = self.run_epoch(model, train, epoch, phase)?;
            info!(
                loss = stats.loss,
                accuracy = stats.accuracy(),
                updates = stats.updates,
                "epoch finished"
            );
            report.epochs.push(stats);

            if let Some(dev) = dev {
                let scores = self.evaluate(model, dev)?;
                info!(uas = scores.uas, las = scores.las, cas = scores.cas, "development evaluation");
                report.dev.push(scores);
            }
        }
        Ok(report)
    }

    /// Train the flat model alone, then warm-start the tensor from it.
    ///
    /// Leaves the flat weights cleared and the MIRA update count at zero.
    pub fn pretrain(&mut self, model: &mut Model, train: &[EncodedSentence]) -> Result<PretrainReport> {
        let span = info_span!("pretrain");
        let _enter = span.enter();

        let phase = Phase {
            gamma: 1.0,
            learning_rate: model.config.pretrain_alpha,
        };
        let mut epochs = Vec::with_capacity(model.config.pretrain_iters);
        for epoch in 1..=model.config.pretrain_iters {
            let stats = self.run_epoch(model, train, epoch, phase)?;
            info!(epoch, loss = stats.loss, accuracy = stats.accuracy(), "flat epoch finished");
            epochs.push(stats);
        }

        let (mut entries, harvest) = {
            let extractor = ArcFeatureExtractor::new(&model.encoder, model.flat.buckets())?;
            model
                .flat
                .harvest(&model.encoder, &extractor, &model.tree.layout(1))?
        };
        let before = entries.len();
        let mut index = 0;
        entries.retain(|entry| {
            let valid = entry.validate(&model.tree, index);
            index += 1;
            match valid {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "dropping harvested entry");
                    false
                }
            }
        });
        let skipped = before - entries.len();
        info!(
            weighted = harvest.weighted,
            unplaced = harvest.unplaced,
            entries = entries.len(),
            skipped,
            "harvested flat weights"
        );

        let decomposition = decompose(&mut model.tree, &entries, &DecompConfig::from_parser_config(&model.config))?;
        if !decomposition.all_converged() {
            warn!("decomposition stopped before convergence on some ranks");
        }

        model.flat.clear_weights();
        self.update_count = 0;
        Ok(PretrainReport {
            epochs,
            harvest,
            skipped,
            decomposition,
        })
    }

    /// One pass over `train` in the main training phase
    pub fn epoch(&mut self, model: &mut Model, train: &[EncodedSentence], epoch: usize) -> Result<EpochStats> {
        let phase = Phase {
            gamma: model.config.gamma,
            learning_rate: model.config.ada_alpha,
        };
        self.run_epoch(model, train, epoch, phase)
    }

    fn run_epoch(&mut self, model: &mut Model, train: &[EncodedSentence], epoch: usize, phase: Phase) -> Result<EpochStats> {
        let batch_size = match model.config.update_mode {
            UpdateMode::AdaGrad => model.config.batch_size,
            UpdateMode::Mira => 1,
        };
        let mut stats = EpochStats {
            epoch,
            ..EpochStats::default()
        };

        for (b, batch) in train.chunks(batch_size).enumerate() {
            let outcomes = self
                .examine_batch(model, batch, phase.gamma)
                .with_context(|| format!("batch {} of epoch {}", b + 1, epoch))?;
            let mut arena = GradientArena::new(&model.tree);
            let mut flat = SparseFeatureVector::new();
            let mut loss = 0.0;
            let mut violated = false;
            for outcome in outcomes {
                stats.correct += outcome.correct;
                stats.total += outcome.total;
                if let Some(gradient) = outcome.gradient {
                    violated = true;
                    loss += outcome.loss;
                    arena.merge(&gradient.arena)?;
                    flat.add_scaled(&gradient.flat, 1.0);
                }
            }
            stats.loss += loss;
            if violated && self.step(model, &mut arena, flat, loss, phase)? {
                stats.updates += 1;
            }
        }
        debug!(epoch, updates = stats.updates, "pass finished");
        Ok(stats)
    }

    #[cfg(feature = "parallel")]
    fn examine_batch(&self, model: &Model, batch: &[EncodedSentence], gamma: f64) -> Result<Vec<Outcome>> {
        batch
            .par_iter()
            .map(|sent| self.examine(model, sent, gamma))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn examine_batch(&self, model: &Model, batch: &[EncodedSentence], gamma: f64) -> Result<Vec<Outcome>> {
        batch.iter().map(|sent| self.examine(model, sent, gamma)).collect()
    }

    fn examine(&self, model: &Model, sent: &EncodedSentence, gamma: f64) -> Result<Outcome> {
        let n = sent.len();
        let total = n.saturating_sub(1);
        if sent.is_empty() {
            return Ok(Outcome {
                loss: 0.0,
                correct: 0,
                total,
                gradient: None,
            });
        }

        let mut scorer = ArcScorer::new(model, sent, gamma)?;
        let scores = scorer.arc_scores()?;
        let heads = self.decoder.decode(&scores, Some(&sent.heads))?;
        let labels = scorer.best_labels(&heads, Some(&sent.labels))?;
        let gold_labels = if model.config.learn_label {
            sent.labels.clone()
        } else {
            vec![None; n]
        };

        let mut correct = 0;
        let mut hamming = 0;
        for m in 1..n {
            let head_ok = heads[m] == sent.heads[m];
            if head_ok {
                correct += 1;
            }
            if !head_ok || labels[m] != gold_labels[m] {
                hamming += 1;
            }
        }

        let loss = hamming as f64 + scorer.tree_score(&heads, &labels)? - scorer.tree_score(&sent.heads, &gold_labels)?;
        let gradient = if loss > 0.0 {
            let mut arena = GradientArena::new(&model.tree);
            let flat = scorer.add_difference((&sent.heads, &gold_labels), (&heads, &labels), &mut arena)?;
            Some(Gradient { arena, flat })
        } else {
            None
        };
        Ok(Outcome {
            loss,
            correct,
            total,
            gradient,
        })
    }

    /// Apply one optimizer step; false if MIRA found a zero-norm direction
    fn step(&mut self, model: &mut Model, arena: &mut GradientArena, mut flat: SparseFeatureVector, loss: f64, phase: Phase) -> Result<bool> {
        flat.aggregate();
        arena.aggregate();
        let tensor = phase.gamma < 1.0;

        match model.config.update_mode {
            UpdateMode::AdaGrad => {
                let eps = model.config.ada_eps;
                if tensor {
                    arena.drain_into(&mut model.tree)?;
                    model.tree.apply_adagrad(phase.learning_rate, eps)?;
                }
                model.flat.apply_adagrad(&flat, phase.learning_rate, eps)?;
            }
            UpdateMode::Mira => {
                let norm = arena.squared_norm() + flat.squared_norm();
                if norm <= 0.0 {
                    arena.clear();
                    return Ok(false);
                }
                self.update_count += 1;
                let alpha = loss / norm;
                if tensor {
                    arena.drain_into(&mut model.tree)?;
                    model.tree.apply_mira(alpha, self.update_count)?;
                }
                model.flat.apply_mira(&flat, alpha, self.update_count)?;
            }
        }
        Ok(true)
    }

    /// Parse every sentence and score the result against the gold trees.
    ///
    /// MIRA runs with `average` evaluate with averaged parameters, swapped
    /// back afterwards.
    pub fn evaluate(&self, model: &mut Model, gold: &[Sentence]) -> Result<EvalScores> {
        let averaged = model.config.update_mode == UpdateMode::Mira && model.config.average;
        if averaged {
            model.tree.average_for_evaluation(self.update_count)?;
            model.flat.average_for_evaluation(self.update_count)?;
        }
        let scores = self.score_all(model, gold);
        if averaged {
            model.tree.restore_training()?;
            model.flat.restore_training()?;
        }
        scores
    }

    fn score_all(&self, model: &Model, gold: &[Sentence]) -> Result<EvalScores> {
        let mut evaluator = Evaluator::new(model.config.eval_with_punc, model.config.learn_label);
        for (i, sentence) in gold.iter().enumerate() {
            let predicted = self
                .parse_sentence(model, sentence)
                .with_context(|| format!("parsing evaluation sentence {}", i + 1))?;
            evaluator.add(sentence, &predicted)?;
        }
        Ok(evaluator.scores())
    }

    /// Copy of `sentence` with predicted heads and labels
    pub fn parse_sentence(&self, model: &Model, sentence: &Sentence) -> Result<Sentence> {
        let encoded = model.encode(sentence)?;
        let parse = model.parse(&encoded, &self.decoder)?;
        Ok(parse.apply(sentence, model.encoder.vocab()))
    }
}
