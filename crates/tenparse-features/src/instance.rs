//! Sentences before and after encoding
//!
//! Token 0 of every sentence is the artificial root. Heads use `-1` for tokens
//! without a head; the root always has head `-1`.

use serde::{Deserialize, Serialize};

use crate::alphabet::{END_TAG_ID, ROOT_TAG, START_TAG_ID};
use crate::error::{FeatureError, FeatureResult};

pub const ROOT_FORM: &str = "<root>";
pub const ROOT_LABEL: &str = "<no-type>";

/// A dependency-annotated sentence as read from a treebank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentence {
    pub forms: Vec<String>,
    pub tags: Vec<String>,
    pub heads: Vec<i32>,
    pub labels: Vec<String>,
    pub language: String,
}

impl Sentence {
    /// Empty sentence holding only the root token
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            forms: vec![ROOT_FORM.to_string()],
            tags: vec![ROOT_TAG.to_string()],
            heads: vec![-1],
            labels: vec![ROOT_LABEL.to_string()],
            language: language.into(),
        }
    }

    pub fn push(&mut self, form: &str, tag: &str, head: i32, label: &str) {
        self.forms.push(form.to_string());
        self.tags.push(tag.to_string());
        self.heads.push(head);
        self.labels.push(label.to_string());
    }

    /// Build from `(form, tag, head, label)` tuples of the non-root tokens
    pub fn from_tokens(language: &str, tokens: &[(&str, &str, i32, &str)]) -> Self {
        let mut sentence = Self::new(language);
        for &(form, tag, head, label) in tokens {
            sentence.push(form, tag, head, label);
        }
        sentence
    }

    /// Number of tokens including the root
    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.len() <= 1
    }

    /// Check that every column has one entry per token and heads are in range
    pub fn validate(&self) -> FeatureResult<()> {
        let n = self.forms.len();
        for (column, len) in [
            ("tags", self.tags.len()),
            ("heads", self.heads.len()),
            ("labels", self.labels.len()),
        ] {
            if len != n {
                return Err(FeatureError::RaggedSentence {
                    column,
                    expected: n,
                    found: len,
                });
            }
        }
        if let Some(&bad) = self.heads.iter().find(|&&h| h < -1 || h >= n as i32) {
            return Err(FeatureError::RaggedSentence {
                column: "heads",
                expected: n,
                found: bad.max(0) as usize,
            });
        }
        Ok(())
    }
}

/// Integer view of a sentence under a fixed vocabulary
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedSentence {
    pub tags: Vec<usize>,
    pub heads: Vec<i32>,
    pub labels: Vec<Option<usize>>,
    /// Row of every token in the embedding table
    pub words: Vec<Option<usize>>,
    /// Index in the typology table, 0 without one
    pub language: usize,
}

impl EncodedSentence {
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.len() <= 1
    }

    /// Tag left of token `i`, the start tag for the root
    #[inline]
    pub fn prev_tag(&self, i: usize) -> usize {
        if i > 0 {
            self.tags[i - 1]
        } else {
            START_TAG_ID
        }
    }

    /// Tag right of token `i`, the end tag for the last token
    #[inline]
    pub fn next_tag(&self, i: usize) -> usize {
        if i + 1 < self.tags.len() {
            self.tags[i + 1]
        } else {
            END_TAG_ID
        }
    }

    /// Gold head of `modifier`, if attached
    #[inline]
    pub fn head(&self, modifier: usize) -> Option<usize> {
        usize::try_from(self.heads[modifier]).ok()
    }

    /// Gold arcs `(head, modifier, label)` of every attached non-root token
    pub fn arcs(&self) -> impl Iterator<Item = (usize, usize, Option<usize>)> + '_ {
        (1..self.len()).filter_map(move |m| self.head(m).map(|h| (h, m, self.labels[m])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentence_validation() {
        let s = Sentence::from_tokens("en", &[("dog", "NOUN", 2, "nsubj"), ("barks", "VERB", 0, "root")]);
        assert_eq!(s.len(), 3);
        assert!(s.validate().is_ok());

        let mut bad = s.clone();
        bad.heads[1] = 7;
        assert!(bad.validate().is_err());
        bad.heads.pop();
        assert!(matches!(
            bad.validate(),
            Err(FeatureError::RaggedSentence { column: "heads", .. })
        ));
    }

    #[test]
    fn test_context_tags_at_edges() {
        let enc = EncodedSentence {
            tags: vec![0, 5, 6],
            heads: vec![-1, 2, -1],
            labels: vec![None, Some(0), None],
            words: vec![None; 3],
            language: 0,
        };
        assert_eq!(enc.prev_tag(0), START_TAG_ID);
        assert_eq!(enc.next_tag(2), END_TAG_ID);
        assert_eq!(enc.prev_tag(2), 5);
        assert_eq!(enc.arcs().collect::<Vec<_>>(), vec![(2, 1, Some(0))]);
    }
}
