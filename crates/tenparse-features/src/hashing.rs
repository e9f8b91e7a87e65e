//! Bit-packed first-order arc templates and their hashing
//!
//! An arc feature is a 64-bit code. From the least significant bit upwards:
//!
//! ```text
//! | distance (4) | label (label_bits) | template (5) | slot_k | ... | slot_1 |
//! ```
//!
//! - distance: `bin + 1`, or 0 for the distance-free copy of a template
//! - label: `label + 1`, or 0 for unlabeled features; absent when labels are
//!   not learned
//! - slots: `tag + 1` per tag position of the template, then for typed
//!   templates one trailing slot holding `class + 1` or `C + family + 1`.
//!   Selective and subject/object templates carry `value + 1` of their
//!   typology feature instead.
//!
//! The code is reduced to a bucket with
//! `|(code ^ ((code & 0xffff_ffff_0000_0000) >> 32)) · 31| mod buckets`
//! in wrapping signed 64-bit arithmetic. Codes and buckets are a stable
//! contract: changing either invalidates every trained flat model.

use tenparse_core::SparseFeatureVector;

use crate::distance::{arc_bin, magnitude_bin};
use crate::encoder::FeatureEncoder;
use crate::error::{FeatureError, FeatureResult};
use crate::instance::EncodedSentence;
use crate::rules::{SelectiveRule, SvoRule};

pub const DISTANCE_BITS: u32 = 4;
pub const TEMPLATE_BITS: u32 = 5;
const MAX_SLOTS: u32 = 5;

/// Tag position read by a template slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagPart {
    Head,
    HeadPrev,
    HeadNext,
    Mod,
    ModPrev,
    ModNext,
    Between,
}

/// Template groups with distinct slot layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateFamily {
    /// Tag conjunctions, typed with a trailing class/family slot
    Delexical,
    /// Undirected tag conjunctions emitted next to typed templates
    Bare,
    /// Tag-pair rules keyed by a word-order value
    Selective,
    /// Labeled subject/object rules keyed by a word-order value
    Svo,
}

/// First-order arc templates; the ordinal is part of the code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArcTemplate {
    AttDist,
    Hp,
    Mp,
    HpMp,
    HppHpMp,
    HpHpnMp,
    HpMppMp,
    HpMpMpn,
    HppHpMpMpn,
    HpHpnMpMpn,
    HpHpnMppMp,
    HppHpMppMp,
    HpBpMp,
    Dist,
    BHp,
    BMp,
    BHpMp,
    SvNoun,
    SvPron,
    VoNoun,
    VoPron,
    AdpNoun,
    AdpPron,
    Gen,
    Adj,
}

impl ArcTemplate {
    pub const ALL: [ArcTemplate; 25] = [
        ArcTemplate::AttDist,
        ArcTemplate::Hp,
        ArcTemplate::Mp,
        ArcTemplate::HpMp,
        ArcTemplate::HppHpMp,
        ArcTemplate::HpHpnMp,
        ArcTemplate::HpMppMp,
        ArcTemplate::HpMpMpn,
        ArcTemplate::HppHpMpMpn,
        ArcTemplate::HpHpnMpMpn,
        ArcTemplate::HpHpnMppMp,
        ArcTemplate::HppHpMppMp,
        ArcTemplate::HpBpMp,
        ArcTemplate::Dist,
        ArcTemplate::BHp,
        ArcTemplate::BMp,
        ArcTemplate::BHpMp,
        ArcTemplate::SvNoun,
        ArcTemplate::SvPron,
        ArcTemplate::VoNoun,
        ArcTemplate::VoPron,
        ArcTemplate::AdpNoun,
        ArcTemplate::AdpPron,
        ArcTemplate::Gen,
        ArcTemplate::Adj,
    ];

    /// Delexical conjunctions emitted with and without the distance field
    pub const CONJUNCTIONS: [ArcTemplate; 11] = [
        ArcTemplate::Hp,
        ArcTemplate::Mp,
        ArcTemplate::HpMp,
        ArcTemplate::HppHpMp,
        ArcTemplate::HpHpnMp,
        ArcTemplate::HpMppMp,
        ArcTemplate::HpMpMpn,
        ArcTemplate::HppHpMpMpn,
        ArcTemplate::HpHpnMpMpn,
        ArcTemplate::HpHpnMppMp,
        ArcTemplate::HppHpMppMp,
    ];

    #[inline]
    pub fn ordinal(self) -> u64 {
        self as u64
    }

    pub fn from_ordinal(ordinal: u64) -> Option<Self> {
        Self::ALL.get(usize::try_from(ordinal).ok()?).copied()
    }

    pub fn family(self) -> TemplateFamily {
        use ArcTemplate::*;
        match self {
            AttDist | Hp | Mp | HpMp | HppHpMp | HpHpnMp | HpMppMp | HpMpMpn | HppHpMpMpn
            | HpHpnMpMpn | HpHpnMppMp | HppHpMppMp | HpBpMp => TemplateFamily::Delexical,
            Dist | BHp | BMp | BHpMp => TemplateFamily::Bare,
            AdpNoun | AdpPron | Gen | Adj => TemplateFamily::Selective,
            SvNoun | SvPron | VoNoun | VoPron => TemplateFamily::Svo,
        }
    }

    /// Tag positions of the slots, in slot order
    pub fn parts(self) -> &'static [TagPart] {
        use ArcTemplate::*;
        use TagPart::*;
        match self {
            Hp | BHp => &[Head],
            Mp | BMp => &[Mod],
            HpMp | BHpMp => &[Head, Mod],
            HppHpMp => &[HeadPrev, Head, Mod],
            HpHpnMp => &[Head, HeadNext, Mod],
            HpMppMp => &[Head, ModPrev, Mod],
            HpMpMpn => &[Head, Mod, ModNext],
            HppHpMpMpn => &[HeadPrev, Head, Mod, ModNext],
            HpHpnMpMpn => &[Head, HeadNext, Mod, ModNext],
            HpHpnMppMp => &[Head, HeadNext, ModPrev, Mod],
            HppHpMppMp => &[HeadPrev, Head, ModPrev, Mod],
            HpBpMp => &[Head, Between, Mod],
            AttDist | Dist | SvNoun | SvPron | VoNoun | VoPron | AdpNoun | AdpPron | Gen | Adj => &[],
        }
    }

    /// Number of slots in a code of this template
    pub fn slot_count(self, typed: bool) -> usize {
        match self.family() {
            TemplateFamily::Delexical => self.parts().len() + typed as usize,
            TemplateFamily::Bare => self.parts().len(),
            TemplateFamily::Selective | TemplateFamily::Svo => 1,
        }
    }

    pub fn from_selective(rule: SelectiveRule) -> Self {
        match rule {
            SelectiveRule::AdpNoun => ArcTemplate::AdpNoun,
            SelectiveRule::AdpPron => ArcTemplate::AdpPron,
            SelectiveRule::Gen => ArcTemplate::Gen,
            SelectiveRule::Adj => ArcTemplate::Adj,
        }
    }

    pub fn from_svo(rule: SvoRule) -> Self {
        match rule {
            SvoRule::SvNoun => ArcTemplate::SvNoun,
            SvoRule::SvPron => ArcTemplate::SvPron,
            SvoRule::VoNoun => ArcTemplate::VoNoun,
            SvoRule::VoPron => ArcTemplate::VoPron,
        }
    }

    pub fn selective_rule(self) -> Option<SelectiveRule> {
        SelectiveRule::ALL
            .into_iter()
            .find(|&r| Self::from_selective(r) == self)
    }

    pub fn svo_rule(self) -> Option<SvoRule> {
        SvoRule::ALL.into_iter().find(|&r| Self::from_svo(r) == self)
    }
}

/// Smallest `k` with `2^k >= x`
pub fn ceil_log2(x: u64) -> u32 {
    if x <= 1 {
        0
    } else {
        64 - (x - 1).leading_zeros()
    }
}

/// 64-bit hash of an arc code
#[inline]
pub fn hash_code(code: u64) -> i64 {
    let folded = code ^ ((code & 0xffff_ffff_0000_0000) >> 32);
    (folded as i64).wrapping_mul(31)
}

/// Bucket of an arc code among `buckets` weights
#[inline]
pub fn bucket(code: u64, buckets: usize) -> usize {
    (hash_code(code).unsigned_abs() % buckets as u64) as usize
}

/// A decoded arc code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArcCode {
    pub template: ArcTemplate,
    /// Raw slot values in slot order (`tag + 1`, `class + 1`, ...)
    pub slots: Vec<u64>,
    pub label: Option<usize>,
    /// Zero-based distance bucket, directed or not depending on the template
    pub distance: Option<usize>,
}

impl ArcCode {
    /// Tag at `part`, if the template reads it
    pub fn tag(&self, part: TagPart) -> Option<usize> {
        let k = self.template.parts().iter().position(|&p| p == part)?;
        Some(self.slots[k] as usize - 1)
    }

    /// Zero-based value of the trailing slot (typed class/family or typology value)
    pub fn trailing(&self) -> Option<usize> {
        self.slots.last().map(|&v| v as usize - 1)
    }
}

/// Packs and unpacks arc codes for fixed alphabet sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArcCodec {
    tag_bits: u32,
    label_bits: u32,
}

impl ArcCodec {
    /// `labels` is `None` when labels are not learned
    pub fn new(tags: usize, classes: usize, families: usize, labels: Option<usize>) -> FeatureResult<Self> {
        let tag_bits = ceil_log2(tags as u64 + 1).max(ceil_log2((classes + families) as u64 + 1) + 1);
        let label_bits = labels.map_or(0, |l| ceil_log2(2 * l as u64 + 1));
        let bits = MAX_SLOTS * tag_bits + TEMPLATE_BITS + label_bits + DISTANCE_BITS;
        if bits > 64 {
            return Err(FeatureError::CodecOverflow { bits });
        }
        Ok(Self {
            tag_bits,
            label_bits,
        })
    }

    pub fn for_encoder(encoder: &FeatureEncoder) -> FeatureResult<Self> {
        let dims = encoder.dims();
        Self::new(
            dims.tags,
            dims.classes,
            dims.families,
            encoder.learn_label().then_some(dims.labels),
        )
    }

    pub fn tag_bits(&self) -> u32 {
        self.tag_bits
    }

    pub fn label_bits(&self) -> u32 {
        self.label_bits
    }

    pub fn encode(
        &self,
        template: ArcTemplate,
        slots: &[u64],
        label: Option<usize>,
        distance: Option<usize>,
    ) -> u64 {
        let mut code = 0u64;
        for &slot in slots {
            code = (code << self.tag_bits) | slot;
        }
        code = (code << TEMPLATE_BITS) | template.ordinal();
        if self.label_bits > 0 {
            code = (code << self.label_bits) | label.map_or(0, |l| l as u64 + 1);
        }
        (code << DISTANCE_BITS) | distance.map_or(0, |d| d as u64 + 1)
    }

    pub fn decode(&self, code: u64, typed: bool) -> FeatureResult<ArcCode> {
        let mask = |bits: u32| (1u64 << bits) - 1;
        let mut rest = code;

        let distance = (rest & mask(DISTANCE_BITS)) as usize;
        rest >>= DISTANCE_BITS;
        let label = if self.label_bits > 0 {
            let l = (rest & mask(self.label_bits)) as usize;
            rest >>= self.label_bits;
            l.checked_sub(1)
        } else {
            None
        };
        let ordinal = rest & mask(TEMPLATE_BITS);
        rest >>= TEMPLATE_BITS;
        let template = ArcTemplate::from_ordinal(ordinal).ok_or(FeatureError::UnknownTemplate(ordinal))?;

        let count = template.slot_count(typed);
        let mut slots = vec![0u64; count];
        for slot in slots.iter_mut().rev() {
            *slot = rest & mask(self.tag_bits);
            rest >>= self.tag_bits;
        }
        if rest != 0 || slots.contains(&0) {
            return Err(FeatureError::MalformedCode {
                code,
                message: format!("{:?} expects {} non-zero slots", template, count),
            });
        }

        Ok(ArcCode {
            template,
            slots,
            label,
            distance: distance.checked_sub(1),
        })
    }
}

/// Emits the flat first-order features of arcs
#[derive(Debug, Clone)]
pub struct ArcFeatureExtractor<'a> {
    encoder: &'a FeatureEncoder,
    codec: ArcCodec,
    buckets: usize,
}

impl<'a> ArcFeatureExtractor<'a> {
    pub fn new(encoder: &'a FeatureEncoder, buckets: usize) -> FeatureResult<Self> {
        Ok(Self {
            encoder,
            codec: ArcCodec::for_encoder(encoder)?,
            buckets,
        })
    }

    pub fn codec(&self) -> &ArcCodec {
        &self.codec
    }

    pub fn buckets(&self) -> usize {
        self.buckets
    }

    /// Codes of the arc `head → modifier`; with a label, the labeled copies
    pub fn codes(&self, sent: &EncodedSentence, head: usize, modifier: usize, label: Option<usize>) -> Vec<u64> {
        let mut out = Vec::with_capacity(64);
        if self.encoder.typed() {
            self.typed_codes(sent, head, modifier, label, &mut out);
        } else {
            self.direct_codes(sent, head, modifier, label, &mut out);
        }
        out
    }

    /// Bucketed feature vector of [`codes`](Self::codes)
    pub fn features(&self, sent: &EncodedSentence, head: usize, modifier: usize, label: Option<usize>) -> SparseFeatureVector {
        self.codes(sent, head, modifier, label)
            .into_iter()
            .map(|code| (bucket(code, self.buckets), 1.0))
            .collect()
    }

    fn tag_slot(sent: &EncodedSentence, head: usize, modifier: usize, part: TagPart) -> Option<u64> {
        let tag = match part {
            TagPart::Head => sent.tags[head],
            TagPart::HeadPrev => sent.prev_tag(head),
            TagPart::HeadNext => sent.next_tag(head),
            TagPart::Mod => sent.tags[modifier],
            TagPart::ModPrev => sent.prev_tag(modifier),
            TagPart::ModNext => sent.next_tag(modifier),
            // emitted once per token between head and modifier
            TagPart::Between => return None,
        };
        Some(tag as u64 + 1)
    }

    fn conjunction_slots(sent: &EncodedSentence, head: usize, modifier: usize, template: ArcTemplate) -> Vec<u64> {
        template
            .parts()
            .iter()
            .filter_map(|&p| Self::tag_slot(sent, head, modifier, p))
            .collect()
    }

    fn direct_codes(
        &self,
        sent: &EncodedSentence,
        head: usize,
        modifier: usize,
        label: Option<usize>,
        out: &mut Vec<u64>,
    ) {
        let bin = Some(arc_bin(head, modifier));
        let codec = &self.codec;

        out.push(codec.encode(ArcTemplate::AttDist, &[], label, bin));
        for template in ArcTemplate::CONJUNCTIONS {
            let slots = Self::conjunction_slots(sent, head, modifier, template);
            out.push(codec.encode(template, &slots, label, None));
            out.push(codec.encode(template, &slots, label, bin));
        }

        let (hp, mp) = (sent.tags[head] as u64 + 1, sent.tags[modifier] as u64 + 1);
        for i in head.min(modifier) + 1..head.max(modifier) {
            let bp = sent.tags[i] as u64 + 1;
            out.push(codec.encode(ArcTemplate::HpBpMp, &[hp, bp, mp], label, None));
        }
    }

    fn typed_codes(
        &self,
        sent: &EncodedSentence,
        head: usize,
        modifier: usize,
        label: Option<usize>,
        out: &mut Vec<u64>,
    ) {
        let codec = &self.codec;
        let encoder = self.encoder;
        let dir = arc_bin(head, modifier);
        let language = encoder.language(sent.language);
        let (class, family) = language.map_or((0, 0), |l| (l.class, l.family));
        let typed_slots = [
            class as u64 + 1,
            (encoder.dims().classes + family) as u64 + 1,
        ];

        for &ty in &typed_slots {
            out.push(codec.encode(ArcTemplate::AttDist, &[ty], label, Some(dir)));
        }
        for template in ArcTemplate::CONJUNCTIONS {
            let mut slots = Self::conjunction_slots(sent, head, modifier, template);
            slots.push(0);
            for &ty in &typed_slots {
                if let Some(last) = slots.last_mut() {
                    *last = ty;
                }
                out.push(codec.encode(template, &slots, label, None));
                out.push(codec.encode(template, &slots, label, Some(dir)));
            }
        }

        let undirected = Some(magnitude_bin(dir));
        let (hp, mp) = (sent.tags[head] as u64 + 1, sent.tags[modifier] as u64 + 1);
        out.push(codec.encode(ArcTemplate::Dist, &[], label, undirected));
        for (template, slots) in [
            (ArcTemplate::BHp, vec![hp]),
            (ArcTemplate::BMp, vec![mp]),
            (ArcTemplate::BHpMp, vec![hp, mp]),
        ] {
            out.push(codec.encode(template, &slots, label, None));
            out.push(codec.encode(template, &slots, label, undirected));
        }

        let Some(language) = language else {
            return;
        };
        let (ht, mt) = (sent.tags[head], sent.tags[modifier]);
        if label.is_some() {
            if let Some(rule) = SvoRule::matching(
                encoder.tag_class(ht),
                encoder.tag_class(mt),
                encoder.label_class(label),
            ) {
                let value = language.value(rule.feature()) as u64 + 1;
                out.push(codec.encode(ArcTemplate::from_svo(rule), &[value], label, Some(dir)));
            }
        }
        if let Some(rule) = SelectiveRule::matching(encoder.tag_class(ht), encoder.tag_class(mt)) {
            let value = language.value(rule.feature()) as u64 + 1;
            out.push(codec.encode(ArcTemplate::from_selective(rule), &[value], label, Some(dir)));
        }
    }
}
