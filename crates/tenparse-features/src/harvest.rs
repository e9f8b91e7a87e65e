//! Placement of flat arc features in the parameter tree
//!
//! A trained flat weight of a first-order template is spread over the tensor
//! nodes as one coordinate per node: the feature index the code lights up in
//! that node, `None` where the code says nothing about the node. The
//! decomposition treats a leaf without a coordinate as a zero vector and a
//! grouping node without one as the product of its children.
//!
//! Templates a tensor mode cannot represent yield no coordinates at all.

use tenparse_core::{NodeRole, TensorMode, TreeLayout};

use crate::distance::{DIRECTED_BINS, MAX_DISTANCE};
use crate::encoder::FeatureEncoder;
use crate::hashing::{ArcCode, TagPart, TemplateFamily};

/// Feature index per role for one code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Coordinates {
    head_window: Option<usize>,
    mod_window: Option<usize>,
    head_pos: Option<usize>,
    mod_pos: Option<usize>,
    head_context: Option<usize>,
    mod_context: Option<usize>,
    distance: Option<usize>,
    label: Option<usize>,
    typo: Option<usize>,
    arc_label: Option<usize>,
    all_typo: Option<usize>,
}

impl Coordinates {
    fn get(&self, role: NodeRole) -> Option<usize> {
        match role {
            NodeRole::Root | NodeRole::LexicalPair => None,
            NodeRole::HeadLexical | NodeRole::ModLexical => Some(0),
            NodeRole::HeadWindow => self.head_window,
            NodeRole::ModWindow => self.mod_window,
            NodeRole::HeadPos => self.head_pos,
            NodeRole::ModPos => self.mod_pos,
            NodeRole::HeadContext => self.head_context,
            NodeRole::ModContext => self.mod_context,
            NodeRole::Distance | NodeRole::DistanceTypo => self.distance,
            NodeRole::Label => self.label,
            NodeRole::Typo => self.typo,
            NodeRole::ArcLabel => self.arc_label,
            NodeRole::AllTypo => self.all_typo,
        }
    }
}

#[inline]
fn bias_or(index: Option<usize>) -> Option<usize> {
    Some(index.map_or(0, |i| 1 + i))
}

impl FeatureEncoder {
    /// Coordinates of `code` for every node of `layout`, in preorder.
    ///
    /// `None` if the tensor mode has no place for the template.
    pub fn harvest_indices(&self, code: &ArcCode, layout: &TreeLayout) -> Option<Vec<Option<usize>>> {
        let coords = match self.mode() {
            TensorMode::Threeway | TensorMode::Multiway => self.direct_coordinates(code)?,
            TensorMode::Hierarchical | TensorMode::ExtendedMultiway => self.typed_coordinates(code)?,
        };
        Some(layout.nodes().iter().map(|n| coords.get(n.role)).collect())
    }

    fn direct_coordinates(&self, code: &ArcCode) -> Option<Coordinates> {
        let parts = code.template.parts();
        if self.typed() || code.template.family() != TemplateFamily::Delexical {
            return None;
        }
        if parts.contains(&TagPart::Between) || code.slots.len() != parts.len() {
            return None;
        }
        let p = self.dims().tags;
        let label = bias_or(code.label);
        let distance = bias_or(code.distance);

        if self.mode() == TensorMode::Threeway {
            let window = |tag: TagPart, prev: TagPart, next: TagPart| {
                Some(match (code.tag(tag), code.tag(prev), code.tag(next)) {
                    (Some(t), Some(pv), _) => 1 + 3 * p + pv * p + t,
                    (Some(t), None, Some(nx)) => 1 + 3 * p + p * p + t * p + nx,
                    (Some(t), None, None) => 1 + t,
                    (None, _, _) => 0,
                })
            };
            return Some(Coordinates {
                head_window: window(TagPart::Head, TagPart::HeadPrev, TagPart::HeadNext),
                mod_window: window(TagPart::Mod, TagPart::ModPrev, TagPart::ModNext),
                distance,
                label,
                ..Default::default()
            });
        }

        let context = |prev: TagPart, next: TagPart| {
            Some(match (code.tag(prev), code.tag(next)) {
                (Some(pv), _) => 1 + pv,
                (None, Some(nx)) => 1 + p + nx,
                (None, None) => 0,
            })
        };
        Some(Coordinates {
            head_pos: bias_or(code.tag(TagPart::Head)),
            mod_pos: bias_or(code.tag(TagPart::Mod)),
            head_context: context(TagPart::HeadPrev, TagPart::HeadNext),
            mod_context: context(TagPart::ModPrev, TagPart::ModNext),
            distance,
            label,
            ..Default::default()
        })
    }

    fn typed_coordinates(&self, code: &ArcCode) -> Option<Coordinates> {
        if !self.typed() {
            return None;
        }
        let hierarchical = self.mode() == TensorMode::Hierarchical;
        let dims = self.dims();
        let (p, c, f) = (dims.tags, dims.classes, dims.families);
        let label = bias_or(code.label);

        match code.template.family() {
            TemplateFamily::Delexical => {
                let parts = code.template.parts();
                if parts.contains(&TagPart::Between) || code.slots.len() != parts.len() + 1 {
                    return None;
                }
                let ty = code.trailing().filter(|&t| t < c + f)?;
                let context = |prev: TagPart, next: TagPart| {
                    Some(match (code.tag(prev), code.tag(next)) {
                        (Some(pv), _) => 1 + ty * p + pv,
                        (None, Some(nx)) => 1 + (c + f) * p + ty * p + nx,
                        (None, None) => 0,
                    })
                };
                let distance = Some(match code.distance {
                    None => 1 + ty,
                    Some(b) => 1 + c + f + MAX_DISTANCE + ty * DIRECTED_BINS + b,
                });
                Some(Coordinates {
                    head_pos: bias_or(code.tag(TagPart::Head)),
                    mod_pos: bias_or(code.tag(TagPart::Mod)),
                    head_context: context(TagPart::HeadPrev, TagPart::HeadNext),
                    mod_context: context(TagPart::ModPrev, TagPart::ModNext),
                    distance,
                    label,
                    all_typo: (!hierarchical).then_some(0),
                    ..Default::default()
                })
            }
            TemplateFamily::Bare => Some(Coordinates {
                head_pos: bias_or(code.tag(TagPart::Head)),
                mod_pos: bias_or(code.tag(TagPart::Mod)),
                head_context: Some(0),
                mod_context: Some(0),
                distance: Some(code.distance.map_or(0, |b| 1 + c + f + b)),
                label,
                all_typo: (!hierarchical).then_some(0),
                ..Default::default()
            }),
            TemplateFamily::Selective => {
                let rule = code.template.selective_rule()?;
                let value = code.trailing()?;
                let bin = code.distance?;
                let offset = self.selective_offset(rule.position());
                let index = offset + value * DIRECTED_BINS + bin;
                if hierarchical {
                    Some(Coordinates {
                        head_context: Some(0),
                        mod_context: Some(0),
                        label,
                        typo: Some(index),
                        ..Default::default()
                    })
                } else {
                    Some(Coordinates {
                        head_pos: Some(0),
                        mod_pos: Some(0),
                        head_context: Some(0),
                        mod_context: Some(0),
                        distance: Some(0),
                        label,
                        all_typo: Some(1 + index),
                        ..Default::default()
                    })
                }
            }
            TemplateFamily::Svo => {
                let rule = code.template.svo_rule()?;
                let class = self.label_class(code.label)?;
                let value = code.trailing()?;
                let bin = code.distance?;
                let index = self.svo_offset(rule.position())
                    + value * 2 * DIRECTED_BINS
                    + bin * 2
                    + class.is_marked() as usize;
                if hierarchical {
                    Some(Coordinates {
                        head_context: Some(0),
                        mod_context: Some(0),
                        arc_label: Some(index),
                        ..Default::default()
                    })
                } else {
                    Some(Coordinates {
                        head_pos: Some(0),
                        mod_pos: Some(0),
                        head_context: Some(0),
                        mod_context: Some(0),
                        distance: Some(0),
                        label,
                        all_typo: Some(1 + self.selective_width() + index),
                        ..Default::default()
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Vocabulary;
    use crate::hashing::{ArcCodec, ArcFeatureExtractor, ArcTemplate};
    use crate::instance::Sentence;
    use crate::typology::Typology;
    use tenparse_core::{FeatureSchema, ParserConfig, TreeShape};

    const TABLE: &str = "2 5 2\n2 2 2 2 2\nen 0 0 0 1 0 0\nja 1 1 1 0 1 1\n";

    fn sentence() -> Sentence {
        Sentence::from_tokens(
            "en",
            &[
                ("dogs", "NOUN", 2, "nsubj"),
                ("chase", "VERB", 0, "root"),
                ("big", "ADJ", 4, "amod"),
                ("cats", "NOUN", 2, "obj"),
                ("in", "ADP", 6, "case"),
                ("parks", "NOUN", 2, "obl"),
            ],
        )
    }

    fn encoder(config: &ParserConfig) -> FeatureEncoder {
        let vocab = Vocabulary::build(&[sentence()]);
        let typology = Typology::parse(TABLE).unwrap();
        FeatureEncoder::new(config, vocab, Some(typology), None).unwrap()
    }

    /// Every harvested coordinate must be one of the features the node reads for that arc
    fn check_consistency(config: ParserConfig) {
        let enc = encoder(&config);
        let shape = TreeShape::build(&config, &enc).unwrap();
        let layout = shape.layout(1);
        let extractor = ArcFeatureExtractor::new(&enc, 1 << 20).unwrap();
        let sent = enc.encode(&sentence()).unwrap();
        let mut harvested = 0;

        for (h, m, label) in sent.arcs() {
            let label = if enc.learn_label() { label } else { None };
            let mut codes = extractor.codes(&sent, h, m, None);
            if label.is_some() {
                codes.extend(extractor.codes(&sent, h, m, label));
            }
            for code in codes {
                let decoded = extractor.codec().decode(code, enc.typed()).unwrap();
                let Some(indices) = enc.harvest_indices(&decoded, &layout) else {
                    continue;
                };
                harvested += 1;
                for (id, index) in indices.iter().enumerate() {
                    let node = layout.node(id);
                    let Some(index) = *index else { continue };
                    assert!(node.has_features(), "{:?}", node.role);
                    let size: usize = enc.kinds(node.role).iter().sum();
                    assert!(index < size, "{:?} {:?}", decoded.template, node.role);
                    let fv = enc.features(node.role, &sent, h, m, decoded.label);
                    assert!(
                        fv.indices().contains(&index),
                        "{:?} places {} in {:?}, arc reads {:?}",
                        decoded.template,
                        index,
                        node.role,
                        fv.indices()
                    );
                }
            }
        }
        assert!(harvested > 0);
    }

    #[test]
    fn test_threeway_coordinates_match_features() {
        check_consistency(ParserConfig::threeway().learn_label(true));
    }

    #[test]
    fn test_multiway_coordinates_match_features() {
        check_consistency(ParserConfig::multiway().learn_label(true));
    }

    #[test]
    fn test_hierarchical_coordinates_match_features() {
        check_consistency(ParserConfig::hierarchical().learn_label(true));
        check_consistency(ParserConfig::hierarchical().learn_label(false));
    }

    #[test]
    fn test_extended_coordinates_match_features() {
        check_consistency(ParserConfig::extended().learn_label(true));
    }

    #[test]
    fn test_between_template_is_skipped() {
        let config = ParserConfig::threeway();
        let enc = encoder(&config);
        let layout = TreeShape::build(&config, &enc).unwrap().layout(1);
        let codec = ArcCodec::for_encoder(&enc).unwrap();
        let code = codec.encode(ArcTemplate::HpBpMp, &[5, 6, 5], None, None);
        let decoded = codec.decode(code, false).unwrap();
        assert_eq!(enc.harvest_indices(&decoded, &layout), None);
    }

    #[test]
    fn test_svo_lands_on_arc_label_only() {
        let config = ParserConfig::hierarchical().learn_label(true);
        let enc = encoder(&config);
        let layout = TreeShape::build(&config, &enc).unwrap().layout(1);
        let codec = ArcCodec::for_encoder(&enc).unwrap();
        let nsubj = enc.vocab().label_id("nsubj");
        let code = codec.encode(ArcTemplate::SvNoun, &[1], nsubj, Some(3));
        let decoded = codec.decode(code, true).unwrap();
        let indices = enc.harvest_indices(&decoded, &layout).unwrap();

        let arc = layout.find(NodeRole::ArcLabel).unwrap();
        let label = layout.find(NodeRole::Label).unwrap();
        let typo = layout.find(NodeRole::Typo).unwrap();
        assert_eq!(indices[arc], Some(3 * 2));
        assert_eq!(indices[label], None);
        assert_eq!(indices[typo], None);
    }
}
