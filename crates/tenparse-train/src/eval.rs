//! Attachment scores
//!
//! UAS and LAS count tokens, CAS counts sentences parsed without any error.
//! Punctuation (gold tag `.` or `PUNCT`) is left out unless asked for.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use tenparse_features::Sentence;

fn is_punctuation(tag: &str) -> bool {
    tag == "." || tag == "PUNCT"
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluator {
    with_punc: bool,
    learn_label: bool,
    unlabeled: usize,
    labeled: usize,
    tokens: usize,
    complete: usize,
    sentences: usize,
}

/// Scores of one evaluation run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalScores {
    pub uas: f64,
    pub las: f64,
    pub cas: f64,
    pub tokens: usize,
    pub sentences: usize,
}

impl Evaluator {
    pub fn new(with_punc: bool, learn_label: bool) -> Self {
        Self {
            with_punc,
            learn_label,
            ..Self::default()
        }
    }

    /// Count one predicted sentence against its gold tree
    pub fn add(&mut self, gold: &Sentence, predicted: &Sentence) -> Result<()> {
        ensure!(
            gold.len() == predicted.len(),
            "predicted sentence has {} tokens, gold has {}",
            predicted.len(),
            gold.len()
        );
        let (mut tokens, mut unlabeled, mut labeled) = (0, 0, 0);
        for m in 1..gold.len() {
            if !self.with_punc && is_punctuation(&gold.tags[m]) {
                continue;
            }
            tokens += 1;
            if gold.heads[m] == predicted.heads[m] {
                unlabeled += 1;
                if gold.labels[m] == predicted.labels[m] {
                    labeled += 1;
                }
            }
        }

        self.tokens += tokens;
        self.unlabeled += unlabeled;
        self.labeled += labeled;
        self.sentences += 1;
        if tokens == unlabeled && (tokens == labeled || !self.learn_label) {
            self.complete += 1;
        }
        Ok(())
    }

    pub fn uas(&self) -> f64 {
        self.unlabeled as f64 / (self.tokens as f64 + 1e-20)
    }

    pub fn las(&self) -> f64 {
        self.labeled as f64 / (self.tokens as f64 + 1e-20)
    }

    pub fn cas(&self) -> f64 {
        self.complete as f64 / (self.sentences as f64 + 1e-20)
    }

    pub fn scores(&self) -> EvalScores {
        EvalScores {
            uas: self.uas(),
            las: self.las(),
            cas: self.cas(),
            tokens: self.tokens,
            sentences: self.sentences,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn gold() -> Sentence {
        Sentence::from_tokens(
            "en",
            &[
                ("the", "DET", 2, "det"),
                ("dog", "NOUN", 3, "nsubj"),
                ("barks", "VERB", 0, "root"),
                (".", "PUNCT", 3, "punct"),
            ],
        )
    }

    #[test]
    fn test_counts_without_punctuation() {
        let gold = gold();
        let mut predicted = gold.clone();
        predicted.labels[2] = "obj".to_string();
        predicted.heads[4] = 1;

        let mut eval = Evaluator::new(false, true);
        eval.add(&gold, &predicted).unwrap();
        let scores = eval.scores();
        assert_eq!(scores.tokens, 3);
        assert_abs_diff_eq!(scores.uas, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(scores.las, 2.0 / 3.0, epsilon = 1e-12);
        assert_eq!(scores.cas, 0.0);

        // labels are ignored for CAS without label learning
        let mut unlabeled = Evaluator::new(false, false);
        unlabeled.add(&gold, &predicted).unwrap();
        assert_abs_diff_eq!(unlabeled.cas(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_counts_with_punctuation() {
        let gold = gold();
        let mut predicted = gold.clone();
        predicted.heads[4] = 1;
        let mut eval = Evaluator::new(true, true);
        eval.add(&gold, &predicted).unwrap();
        assert_abs_diff_eq!(eval.uas(), 0.75, epsilon = 1e-12);
        assert_eq!(eval.cas(), 0.0);
    }

    #[test]
    fn test_empty_and_mismatched() {
        let eval = Evaluator::new(false, false);
        assert_eq!(eval.uas(), 0.0);
        let mut eval = Evaluator::new(false, false);
        let short = Sentence::from_tokens("en", &[("dog", "NOUN", 0, "root")]);
        assert!(eval.add(&gold(), &short).is_err());
    }
}
