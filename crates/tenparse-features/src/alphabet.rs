//! String alphabets for tags and labels
//!
//! The tag alphabet reserves four ids: the root token's tag, the sentence-start
//! and sentence-end padding tags used by context features, and a catch-all for
//! tags unseen in training. A handful of universal tags and dependency labels
//! drive the selective typology features; their classes are resolved once when
//! the vocabulary is built.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::instance::Sentence;

pub const ROOT_TAG: &str = "<root-POS>";
pub const START_TAG: &str = "<start>";
pub const END_TAG: &str = "<end>";
pub const UNKNOWN_TAG: &str = "<unknown>";

pub const ROOT_TAG_ID: usize = 0;
pub const START_TAG_ID: usize = 1;
pub const END_TAG_ID: usize = 2;
pub const UNKNOWN_TAG_ID: usize = 3;

/// Bidirectional string ↔ id map with insertion-ordered ids
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Alphabet {
    entries: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Alphabet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reserved(reserved: &[&str]) -> Self {
        let mut alphabet = Self::new();
        for name in reserved {
            alphabet.insert(name);
        }
        alphabet
    }

    /// Id of `name`, inserting it if new
    pub fn insert(&mut self, name: &str) -> usize {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = self.entries.len();
        self.entries.push(name.to_string());
        self.index.insert(name.to_string(), id);
        id
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn name(&self, id: usize) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.entries.iter().enumerate().map(|(i, s)| (i, s.as_str()))
    }

    /// Rebuild the lookup index after deserialization
    pub fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i))
            .collect();
    }
}

/// Universal tags that trigger typology features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagClass {
    Noun,
    Pron,
    Adj,
    Verb,
    Adp,
}

impl TagClass {
    pub fn of(tag: &str) -> Option<Self> {
        match tag.to_ascii_uppercase().as_str() {
            "NOUN" => Some(TagClass::Noun),
            "PRON" => Some(TagClass::Pron),
            "ADJ" => Some(TagClass::Adj),
            "VERB" => Some(TagClass::Verb),
            "ADP" => Some(TagClass::Adp),
            _ => None,
        }
    }
}

/// Grammatical relations that trigger subject/object order features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LabelClass {
    Subject,
    PassiveSubject,
    DirectObject,
    IndirectObject,
}

impl LabelClass {
    /// Class of a label name; subtypes after `:` are ignored except for
    /// `nsubj:pass`
    pub fn of(label: &str) -> Option<Self> {
        let lower = label.to_ascii_lowercase();
        if lower == "nsubj:pass" {
            return Some(LabelClass::PassiveSubject);
        }
        match lower.split(':').next().unwrap_or_default() {
            "nsubj" | "sbj" => Some(LabelClass::Subject),
            "nsubjpass" | "sbjpass" => Some(LabelClass::PassiveSubject),
            "dobj" | "obj" => Some(LabelClass::DirectObject),
            "iobj" => Some(LabelClass::IndirectObject),
            _ => None,
        }
    }

    /// True for the passive subject and the indirect object
    pub fn is_marked(self) -> bool {
        matches!(self, LabelClass::PassiveSubject | LabelClass::IndirectObject)
    }

    pub fn is_subject(self) -> bool {
        matches!(self, LabelClass::Subject | LabelClass::PassiveSubject)
    }
}

/// Tag and label alphabets of a training corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub tags: Alphabet,
    pub labels: Alphabet,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            tags: Alphabet::with_reserved(&[ROOT_TAG, START_TAG, END_TAG, UNKNOWN_TAG]),
            labels: Alphabet::new(),
        }
    }
}

impl Vocabulary {
    /// Collect tags and labels of every non-root token
    pub fn build<'a, I: IntoIterator<Item = &'a Sentence>>(sentences: I) -> Self {
        let mut vocab = Self::default();
        for sentence in sentences {
            for i in 1..sentence.len() {
                vocab.tags.insert(&sentence.tags[i]);
                vocab.labels.insert(&sentence.labels[i]);
            }
        }
        log::debug!(
            "vocabulary: {} tags, {} labels",
            vocab.tags.len(),
            vocab.labels.len()
        );
        vocab
    }

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    /// Tag id, falling back to the unknown tag
    pub fn tag_id(&self, tag: &str) -> usize {
        if tag == ROOT_TAG {
            return ROOT_TAG_ID;
        }
        self.tags.get(tag).unwrap_or(UNKNOWN_TAG_ID)
    }

    pub fn label_id(&self, label: &str) -> Option<usize> {
        self.labels.get(label)
    }

    /// Class of every tag id
    pub fn tag_classes(&self) -> Vec<Option<TagClass>> {
        self.tags.iter().map(|(_, name)| TagClass::of(name)).collect()
    }

    /// Class of every label id
    pub fn label_classes(&self) -> Vec<Option<LabelClass>> {
        self.labels.iter().map(|(_, name)| LabelClass::of(name)).collect()
    }

    /// Rebuild lookup indices after deserialization
    pub fn reindex(&mut self) {
        self.tags.reindex();
        self.labels.reindex();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_ids() {
        let vocab = Vocabulary::default();
        assert_eq!(vocab.tags.get(ROOT_TAG), Some(ROOT_TAG_ID));
        assert_eq!(vocab.tags.get(START_TAG), Some(START_TAG_ID));
        assert_eq!(vocab.tags.get(END_TAG), Some(END_TAG_ID));
        assert_eq!(vocab.tag_id("NOUN"), UNKNOWN_TAG_ID);
    }

    #[test]
    fn test_label_classes() {
        assert_eq!(LabelClass::of("nsubj"), Some(LabelClass::Subject));
        assert_eq!(LabelClass::of("nsubj:pass"), Some(LabelClass::PassiveSubject));
        assert_eq!(LabelClass::of("SBJ"), Some(LabelClass::Subject));
        assert_eq!(LabelClass::of("obj"), Some(LabelClass::DirectObject));
        assert_eq!(LabelClass::of("iobj"), Some(LabelClass::IndirectObject));
        assert_eq!(LabelClass::of("amod"), None);
        assert!(LabelClass::IndirectObject.is_marked());
    }

    #[test]
    fn test_reindex_after_serde() {
        let mut vocab = Vocabulary::default();
        vocab.tags.insert("VERB");
        let json = serde_json::to_string(&vocab).unwrap();
        let mut back: Vocabulary = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tags.get("VERB"), None);
        back.reindex();
        assert_eq!(back.tags.get("VERB"), Some(4));
    }
}
