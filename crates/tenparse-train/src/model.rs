//! Parser model: feature encoder, tensor tree and flat weights
//!
//! Arc scores mix the two models as `γ·flat + (1 − γ)·tensor`. Each side is
//! only evaluated when its weight is non-zero.

use anyhow::{ensure, Context, Result};
use scirs2_core::random::{rngs::StdRng, SeedableRng};
use tenparse_compose::{EncodedInstance, GradientArena, SentenceScorer};
use tenparse_core::{OptimizerKind, ParameterNode, ParserConfig, SparseFeatureVector, TreeShape};
use tenparse_features::{
    ArcFeatureExtractor, EncodedSentence, Embeddings, FeatureEncoder, Sentence, Typology, Vocabulary,
};

use crate::decoder::{ArcScores, DependencyDecoder};
use crate::flat::FlatModel;

/// Heads and labels predicted for one sentence
#[derive(Debug, Clone, PartialEq)]
pub struct Parse {
    pub heads: Vec<i32>,
    pub labels: Vec<Option<usize>>,
}

impl Parse {
    /// Copy of `sentence` carrying the predicted heads and label names
    pub fn apply(&self, sentence: &Sentence, vocab: &Vocabulary) -> Sentence {
        let mut out = sentence.clone();
        out.heads.clone_from(&self.heads);
        for (i, label) in self.labels.iter().enumerate().skip(1) {
            out.labels[i] = label
                .and_then(|l| vocab.labels.name(l))
                .unwrap_or("_")
                .to_string();
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct Model {
    pub config: ParserConfig,
    pub encoder: FeatureEncoder,
    pub tree: ParameterNode,
    pub flat: FlatModel,
}

impl Model {
    /// Build the model over a training corpus.
    ///
    /// Every feature the gold trees read is marked active in the tensor tree,
    /// the gold arc codes are recorded and frozen, and the factors get their
    /// random start. Returns the encoded training sentences alongside.
    pub fn build(
        config: ParserConfig,
        sentences: &[Sentence],
        typology: Option<Typology>,
        embeddings: Option<Embeddings>,
    ) -> Result<(Self, Vec<EncodedSentence>)> {
        config.validate().context("invalid parser configuration")?;
        let vocab = Vocabulary::build(sentences);
        let encoder = FeatureEncoder::new(&config, vocab, typology, embeddings)?;
        let shape = TreeShape::build(&config, &encoder)?;
        let mut tree = ParameterNode::from_shape(&shape, OptimizerKind::from_config(&config))?;
        let mut flat = FlatModel::new(config.hash_buckets, config.update_mode, config.mira_c);

        let encoded = sentences
            .iter()
            .enumerate()
            .map(|(i, s)| encoder.encode(s).with_context(|| format!("encoding training sentence {}", i + 1)))
            .collect::<Result<Vec<_>>>()?;
        {
            let extractor = ArcFeatureExtractor::new(&encoder, config.hash_buckets)?;
            for sent in &encoded {
                encoder.mark_instance(&mut tree, sent)?;
                flat.record_gold(&extractor, sent, config.learn_label)?;
            }
        }
        flat.freeze();
        tree.random_init(config.init_scale, &mut StdRng::seed_from_u64(config.seed));

        log::info!(
            "built {:?} model: {} nodes, {} tags, {} labels, {} gold arc codes",
            config.tensor_mode,
            tree.node_count(),
            encoder.dims().tags,
            encoder.dims().labels,
            flat.codes().len()
        );
        Ok((
            Self {
                config,
                encoder,
                tree,
                flat,
            },
            encoded,
        ))
    }

    pub fn encode(&self, sentence: &Sentence) -> Result<EncodedSentence> {
        Ok(self.encoder.encode(sentence)?)
    }

    pub fn scorer<'m>(&'m self, sent: &'m EncodedSentence) -> Result<ArcScorer<'m>> {
        ArcScorer::new(self, sent, self.config.gamma)
    }

    /// Best tree of `sent` under the current parameters
    pub fn parse<D: DependencyDecoder>(&self, sent: &EncodedSentence, decoder: &D) -> Result<Parse> {
        let mut scorer = self.scorer(sent)?;
        let scores = scorer.arc_scores()?;
        let heads = decoder.decode(&scores, None)?;
        let labels = scorer.best_labels(&heads, None)?;
        Ok(Parse { heads, labels })
    }
}

/// Mixed arc scores of one sentence
pub struct ArcScorer<'m> {
    model: &'m Model,
    sent: &'m EncodedSentence,
    gamma: f64,
    tensor: Option<SentenceScorer<'m, EncodedInstance<'m>>>,
    extractor: Option<ArcFeatureExtractor<'m>>,
}

impl<'m> ArcScorer<'m> {
    /// Scorer mixing with `gamma` (1 = flat only, 0 = tensor only)
    pub fn new(model: &'m Model, sent: &'m EncodedSentence, gamma: f64) -> Result<Self> {
        let tensor = if gamma < 1.0 {
            Some(SentenceScorer::new(&model.tree, EncodedInstance::new(&model.encoder, sent))?)
        } else {
            None
        };
        let extractor = if gamma > 0.0 {
            Some(ArcFeatureExtractor::new(&model.encoder, model.flat.buckets())?)
        } else {
            None
        };
        Ok(Self {
            model,
            sent,
            gamma,
            tensor,
            extractor,
        })
    }

    pub fn len(&self) -> usize {
        self.sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }

    fn learn_label(&self) -> bool {
        self.model.config.learn_label
    }

    /// Flat features of the arc, the labeled copies only when `label` is set
    fn flat_features(&self, head: usize, modifier: usize, label: Option<usize>) -> Option<SparseFeatureVector> {
        self.extractor
            .as_ref()
            .map(|x| x.features(self.sent, head, modifier, label))
    }

    fn flat_score(&self, head: usize, modifier: usize, label: Option<usize>) -> f64 {
        self.flat_features(head, modifier, label)
            .map_or(0.0, |fv| self.model.flat.score(&fv))
    }

    fn tensor_score(&mut self, head: usize, modifier: usize, label: Option<usize>) -> Result<f64> {
        match &mut self.tensor {
            Some(scorer) => Ok(scorer.score(head, modifier, label)?),
            None => Ok(0.0),
        }
    }

    /// Score of the arc with `label` under the mixture
    pub fn arc_score(&mut self, head: usize, modifier: usize, label: Option<usize>) -> Result<f64> {
        let mut flat = self.flat_score(head, modifier, None);
        if label.is_some() {
            flat += self.flat_score(head, modifier, label);
        }
        let tensor = self.tensor_score(head, modifier, label)?;
        Ok(self.gamma * flat + (1.0 - self.gamma) * tensor)
    }

    /// Unlabeled scores of every arc, as the decoder sees them
    pub fn arc_scores(&mut self) -> Result<ArcScores> {
        let n = self.len();
        ArcScores::from_fn(n, |h, m| self.arc_score(h, m, None))
    }

    /// Best label of every attached token of `heads`.
    ///
    /// With `gold`, labels other than the gold label get `+1` (loss-augmented
    /// inference). Without label learning every label is `None`.
    pub fn best_labels(&mut self, heads: &[i32], gold: Option<&[Option<usize>]>) -> Result<Vec<Option<usize>>> {
        let n = self.len();
        let mut labels = vec![None; n];
        if !self.learn_label() {
            return Ok(labels);
        }
        let count = self.model.encoder.dims().labels;
        for (m, &h) in heads.iter().enumerate().skip(1) {
            let Ok(h) = usize::try_from(h) else {
                continue;
            };
            let mut best: Option<(usize, f64)> = None;
            for l in 0..count {
                let mut score = self.gamma * self.flat_score(h, m, Some(l))
                    + (1.0 - self.gamma) * self.tensor_score(h, m, Some(l))?;
                if let Some(gold) = gold {
                    if gold.get(m).copied().flatten() != Some(l) {
                        score += 1.0;
                    }
                }
                if best.map_or(true, |(_, s)| score > s + 1e-10) {
                    best = Some((l, score));
                }
            }
            labels[m] = best.map(|(l, _)| l);
        }
        Ok(labels)
    }

    /// Mixed score of a whole labeled tree (`-1` heads skipped)
    pub fn tree_score(&mut self, heads: &[i32], labels: &[Option<usize>]) -> Result<f64> {
        let mut total = 0.0;
        for (m, &h) in heads.iter().enumerate().skip(1) {
            if let Ok(h) = usize::try_from(h) {
                total += self.arc_score(h, m, labels.get(m).copied().flatten())?;
            }
        }
        Ok(total)
    }

    /// Accumulate the ascent direction `score(gold) − score(predicted)`.
    ///
    /// Tensor gradients go into `arena` weighted by `1 − γ`; the returned flat
    /// gradient is weighted by `γ`. Arcs on which both trees agree cancel.
    pub fn add_difference(
        &mut self,
        gold: (&[i32], &[Option<usize>]),
        predicted: (&[i32], &[Option<usize>]),
        arena: &mut GradientArena,
    ) -> Result<SparseFeatureVector> {
        let n = self.len();
        for tree in [gold, predicted] {
            ensure!(
                tree.0.len() == n && tree.1.len() == n,
                "tree of {} heads and {} labels for a {}-token sentence",
                tree.0.len(),
                tree.1.len(),
                n
            );
        }
        let labels = self.learn_label();
        if let Some(scorer) = &mut self.tensor {
            scorer.add_tree_difference(gold, predicted, labels, 1.0 - self.gamma, arena)?;
        }

        let mut flat = SparseFeatureVector::new();
        if self.extractor.is_none() {
            return Ok(flat);
        }
        for m in 1..n {
            let (gold_label, pred_label) = if labels {
                (gold.1[m], predicted.1[m])
            } else {
                (None, None)
            };
            if gold.0[m] == predicted.0[m] && gold_label == pred_label {
                continue;
            }
            for (head, label, sign) in [(gold.0[m], gold_label, 1.0), (predicted.0[m], pred_label, -1.0)] {
                let Ok(h) = usize::try_from(head) else {
                    continue;
                };
                if let Some(fv) = self.flat_features(h, m, None) {
                    flat.add_scaled(&fv, sign * self.gamma);
                }
                if label.is_some() {
                    if let Some(fv) = self.flat_features(h, m, label) {
                        flat.add_scaled(&fv, sign * self.gamma);
                    }
                }
            }
        }
        flat.aggregate();
        Ok(flat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::EisnerDecoder;

    fn corpus() -> Vec<Sentence> {
        vec![
            Sentence::from_tokens("en", &[("dog", "NOUN", 2, "nsubj"), ("barks", "VERB", 0, "root")]),
            Sentence::from_tokens(
                "en",
                &[("the", "DET", 2, "det"), ("cat", "NOUN", 3, "nsubj"), ("sleeps", "VERB", 0, "root")],
            ),
        ]
    }

    #[test]
    fn test_build_marks_and_records() {
        let config = ParserConfig::multiway().rank(3).learn_label(true).hash_buckets(1 << 16);
        let (model, encoded) = Model::build(config, &corpus(), None, None).unwrap();
        assert_eq!(encoded.len(), 2);
        assert!(model.flat.is_frozen());
        assert!(!model.flat.codes().is_empty());
        assert!(model.tree.preorder().iter().any(|n| n.active_count() > 0));
    }

    #[test]
    fn test_mixture_weights() {
        let config = ParserConfig::multiway().rank(2).gamma(0.5).hash_buckets(1 << 16);
        let (mut model, encoded) = Model::build(config, &corpus(), None, None).unwrap();
        let sent = &encoded[0];

        let tensor = {
            let mut only_tensor = ArcScorer::new(&model, sent, 0.0).unwrap();
            only_tensor.arc_score(2, 1, None).unwrap()
        };
        let extractor = ArcFeatureExtractor::new(&model.encoder, 1 << 16).unwrap();
        let fv = extractor.features(sent, 2, 1, None);
        model.flat.apply_adagrad(&fv, 0.1, 1e-5).unwrap();
        let flat = model.flat.score(&fv);
        assert!(flat > 0.0);

        let mut mixed = model.scorer(sent).unwrap();
        let score = mixed.arc_score(2, 1, None).unwrap();
        assert!((score - (0.5 * flat + 0.5 * tensor)).abs() < 1e-12);
    }

    #[test]
    fn test_parse_shapes() {
        let config = ParserConfig::threeway().rank(2).learn_label(true).gamma(0.5).hash_buckets(1 << 16);
        let sentences = corpus();
        let (model, encoded) = Model::build(config, &sentences, None, None).unwrap();
        let parse = model.parse(&encoded[1], &EisnerDecoder).unwrap();
        assert_eq!(parse.heads.len(), 4);
        assert_eq!(parse.heads[0], -1);
        assert!(parse.labels[1..].iter().all(Option::is_some));

        let written = parse.apply(&sentences[1], model.encoder.vocab());
        assert_eq!(written.heads, parse.heads);
        assert_ne!(written.labels[1], "_");
    }
}
