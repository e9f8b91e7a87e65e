//! Selective-sharing rules
//!
//! A rule fires on an arc whose head and modifier tags (and, for subject and
//! object rules, label) match a word-order feature of the typology table. The
//! same rules drive the tensor's typology leaves and the flat typed templates.

use crate::alphabet::{LabelClass, TagClass};
use crate::typology::TypoFeature;

/// Rules that depend on the tag pair only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectiveRule {
    AdpNoun,
    AdpPron,
    Gen,
    Adj,
}

impl SelectiveRule {
    pub const ALL: [SelectiveRule; 4] = [
        SelectiveRule::AdpNoun,
        SelectiveRule::AdpPron,
        SelectiveRule::Gen,
        SelectiveRule::Adj,
    ];

    pub fn matching(head: Option<TagClass>, modifier: Option<TagClass>) -> Option<Self> {
        match (head?, modifier?) {
            (TagClass::Adp, TagClass::Noun) => Some(SelectiveRule::AdpNoun),
            (TagClass::Adp, TagClass::Pron) => Some(SelectiveRule::AdpPron),
            (TagClass::Noun, TagClass::Noun) => Some(SelectiveRule::Gen),
            (TagClass::Noun, TagClass::Adj) => Some(SelectiveRule::Adj),
            _ => None,
        }
    }

    pub fn feature(self) -> TypoFeature {
        match self {
            SelectiveRule::AdpNoun | SelectiveRule::AdpPron => TypoFeature::Prep,
            SelectiveRule::Gen => TypoFeature::Gen,
            SelectiveRule::Adj => TypoFeature::Adj,
        }
    }

    pub fn position(self) -> usize {
        self as usize
    }
}

/// Subject and object order rules, split by nominal or pronominal modifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SvoRule {
    SvNoun,
    SvPron,
    VoNoun,
    VoPron,
}

impl SvoRule {
    pub const ALL: [SvoRule; 4] = [
        SvoRule::SvNoun,
        SvoRule::SvPron,
        SvoRule::VoNoun,
        SvoRule::VoPron,
    ];

    pub fn matching(
        head: Option<TagClass>,
        modifier: Option<TagClass>,
        label: Option<LabelClass>,
    ) -> Option<Self> {
        if head? != TagClass::Verb {
            return None;
        }
        let subject = label?.is_subject();
        match (modifier?, subject) {
            (TagClass::Noun, true) => Some(SvoRule::SvNoun),
            (TagClass::Pron, true) => Some(SvoRule::SvPron),
            (TagClass::Noun, false) => Some(SvoRule::VoNoun),
            (TagClass::Pron, false) => Some(SvoRule::VoPron),
            _ => None,
        }
    }

    pub fn feature(self) -> TypoFeature {
        match self {
            SvoRule::SvNoun | SvoRule::SvPron => TypoFeature::Sv,
            SvoRule::VoNoun | SvoRule::VoPron => TypoFeature::Vo,
        }
    }

    pub fn position(self) -> usize {
        self as usize
    }
}
