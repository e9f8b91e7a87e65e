//! Feature encoder for the parameter tree
//!
//! [`FeatureEncoder`] fixes the feature-kind widths of every node role (it is
//! the [`FeatureSchema`] the tree shape is built from) and produces the sparse
//! feature vector each node reads for a given arc. Widths are functions of the
//! tag count `P`, label count `L`, language class count `C`, family count `F`,
//! the distance window `D` and the embedding dimension `E`:
//!
//! | role | kinds |
//! |---|---|
//! | head/modifier window | `[1, P, P, P, P², P²]` |
//! | head/modifier tag | `[1, P]` |
//! | head/modifier context | `[1, P, P]`, typed `[1, C·P, F·P, C·P, F·P]` |
//! | distance | `[1, 2D]` |
//! | typed distance | `[1, C, F, D, C·2D, F·2D]` |
//! | label | `[1, L]` |
//! | selective typology | `[Prep·2D, Prep·2D, Gen·2D, Adj·2D]` |
//! | subject/object order | `[SV·4D, SV·4D, VO·4D, VO·4D]` |
//! | all typology | `[1, selective…, subject/object…]` |
//! | lexical | `[1, E]` |
//!
//! Index 0 of every kind list is an always-on bias except for the two
//! typology kinds owned by grouping nodes, whose vectors are empty unless a
//! rule fires.

use tenparse_core::{
    FeatureSchema, NodeRole, ParameterNode, ParserConfig, SparseFeatureVector, TensorMode,
};

use crate::alphabet::{LabelClass, TagClass, Vocabulary};
use crate::distance::{arc_bin, magnitude_bin, DIRECTED_BINS, MAX_DISTANCE};
use crate::embeddings::Embeddings;
use crate::error::{FeatureError, FeatureResult};
use crate::instance::{EncodedSentence, Sentence};
use crate::rules::{SelectiveRule, SvoRule};
use crate::typology::{LanguageTypology, TypoFeature, Typology};

/// Alphabet sizes the feature widths are derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureDims {
    pub tags: usize,
    pub labels: usize,
    pub classes: usize,
    pub families: usize,
    pub embedding: usize,
    pub typo_values: [usize; 5],
}

impl FeatureDims {
    fn values(&self, feature: TypoFeature) -> usize {
        self.typo_values[feature.column()]
    }

    fn selective_kinds(&self) -> Vec<usize> {
        SelectiveRule::ALL
            .iter()
            .map(|r| self.values(r.feature()) * DIRECTED_BINS)
            .collect()
    }

    fn svo_kinds(&self) -> Vec<usize> {
        SvoRule::ALL
            .iter()
            .map(|r| self.values(r.feature()) * 2 * DIRECTED_BINS)
            .collect()
    }
}

fn starts(kinds: &[usize]) -> Vec<usize> {
    kinds
        .iter()
        .scan(0, |acc, &k| {
            let start = *acc;
            *acc += k;
            Some(start)
        })
        .collect()
}

/// Which arc coordinate a node's features depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependence {
    /// The head token
    Head,
    /// The modifier token
    Modifier,
    /// The directed distance bucket
    Distance,
    /// The label (or its absence)
    Label,
    /// Head tag, modifier tag, distance and label together
    Arc,
}

impl Dependence {
    pub fn of(role: NodeRole) -> Option<Self> {
        match role {
            NodeRole::Root | NodeRole::LexicalPair => None,
            NodeRole::Distance | NodeRole::DistanceTypo => Some(Dependence::Distance),
            NodeRole::Label => Some(Dependence::Label),
            NodeRole::Typo | NodeRole::ArcLabel | NodeRole::AllTypo => Some(Dependence::Arc),
            r if r.reads_head() => Some(Dependence::Head),
            _ => Some(Dependence::Modifier),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    mode: TensorMode,
    learn_label: bool,
    lexical: bool,
    typed: bool,
    dims: FeatureDims,
    vocab: Vocabulary,
    tag_classes: Vec<Option<TagClass>>,
    label_classes: Vec<Option<LabelClass>>,
    typology: Option<Typology>,
    embeddings: Option<Embeddings>,
}

impl FeatureEncoder {
    pub fn new(
        config: &ParserConfig,
        vocab: Vocabulary,
        typology: Option<Typology>,
        embeddings: Option<Embeddings>,
    ) -> FeatureResult<Self> {
        let typed_mode = matches!(
            config.tensor_mode,
            TensorMode::Hierarchical | TensorMode::ExtendedMultiway
        );
        if (typed_mode || config.typed) && typology.is_none() {
            return Err(FeatureError::MissingTypology(format!("{:?}", config.tensor_mode)));
        }
        if config.lexical && embeddings.is_none() {
            return Err(FeatureError::MissingEmbeddings);
        }

        let dims = FeatureDims {
            tags: vocab.tag_count(),
            labels: vocab.label_count(),
            classes: typology.as_ref().map_or(0, Typology::class_count),
            families: typology.as_ref().map_or(0, Typology::family_count),
            embedding: embeddings.as_ref().map_or(0, Embeddings::dim),
            typo_values: typology.as_ref().map_or([0; 5], |t| {
                TypoFeature::ALL.map(|f| t.value_count(f))
            }),
        };

        Ok(Self {
            mode: config.tensor_mode,
            learn_label: config.learn_label,
            lexical: config.lexical,
            typed: typed_mode || config.typed,
            dims,
            tag_classes: vocab.tag_classes(),
            label_classes: vocab.label_classes(),
            vocab,
            typology,
            embeddings,
        })
    }

    pub fn dims(&self) -> &FeatureDims {
        &self.dims
    }

    pub fn mode(&self) -> TensorMode {
        self.mode
    }

    pub fn learn_label(&self) -> bool {
        self.learn_label
    }

    /// True if flat templates carry the language class and family
    pub fn typed(&self) -> bool {
        self.typed
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn typology(&self) -> Option<&Typology> {
        self.typology.as_ref()
    }

    pub fn embeddings(&self) -> Option<&Embeddings> {
        self.embeddings.as_ref()
    }

    #[inline]
    pub fn tag_class(&self, tag: usize) -> Option<TagClass> {
        self.tag_classes.get(tag).copied().flatten()
    }

    #[inline]
    pub fn label_class(&self, label: Option<usize>) -> Option<LabelClass> {
        label.and_then(|l| self.label_classes.get(l).copied().flatten())
    }

    pub fn language(&self, language: usize) -> Option<&LanguageTypology> {
        self.typology.as_ref().and_then(|t| t.get(language))
    }

    fn typed_contexts(&self) -> bool {
        matches!(
            self.mode,
            TensorMode::Hierarchical | TensorMode::ExtendedMultiway
        )
    }

    /// Map a sentence onto the vocabulary, typology and embedding table
    pub fn encode(&self, sentence: &Sentence) -> FeatureResult<EncodedSentence> {
        sentence.validate()?;
        let language = match &self.typology {
            Some(t) => t.language(&sentence.language)?,
            None => 0,
        };
        let labels = sentence
            .labels
            .iter()
            .enumerate()
            .map(|(i, l)| if i == 0 { None } else { self.vocab.label_id(l) })
            .collect();
        let words = match &self.embeddings {
            Some(e) if self.lexical => sentence.forms.iter().map(|w| e.lookup(w)).collect(),
            _ => vec![None; sentence.len()],
        };

        Ok(EncodedSentence {
            tags: sentence.tags.iter().map(|t| self.vocab.tag_id(t)).collect(),
            heads: sentence.heads.clone(),
            labels,
            words,
            language,
        })
    }

    /// Feature vector of a token-dependent role at token `i`
    pub fn token_features(&self, role: NodeRole, sent: &EncodedSentence, i: usize) -> SparseFeatureVector {
        let p = self.dims.tags;
        let tag = sent.tags[i];
        let prev = sent.prev_tag(i);
        let next = sent.next_tag(i);

        match role {
            NodeRole::HeadWindow | NodeRole::ModWindow => SparseFeatureVector::from_indices([
                0,
                1 + tag,
                1 + p + prev,
                1 + 2 * p + next,
                1 + 3 * p + prev * p + tag,
                1 + 3 * p + p * p + tag * p + next,
            ]),
            NodeRole::HeadPos | NodeRole::ModPos => SparseFeatureVector::from_indices([0, 1 + tag]),
            NodeRole::HeadContext | NodeRole::ModContext if self.typed_contexts() => {
                let (c, f) = self.class_family(sent.language);
                let cp = self.dims.classes * p;
                let fp = self.dims.families * p;
                SparseFeatureVector::from_indices([
                    0,
                    1 + c * p + prev,
                    1 + cp + f * p + prev,
                    1 + cp + fp + c * p + next,
                    1 + 2 * cp + fp + f * p + next,
                ])
            }
            NodeRole::HeadContext | NodeRole::ModContext => {
                SparseFeatureVector::from_indices([0, 1 + prev, 1 + p + next])
            }
            NodeRole::HeadLexical | NodeRole::ModLexical => match &self.embeddings {
                Some(e) => e.features(sent.words[i]),
                None => SparseFeatureVector::from_indices([0]),
            },
            _ => SparseFeatureVector::new(),
        }
    }

    fn class_family(&self, language: usize) -> (usize, usize) {
        self.language(language).map_or((0, 0), |l| (l.class, l.family))
    }

    /// Untyped distance leaf: bias and directed bucket
    pub fn distance_features(&self, bin: usize) -> SparseFeatureVector {
        SparseFeatureVector::from_indices([0, 1 + bin])
    }

    /// Typed distance leaf of `bin` in `language`
    pub fn distance_typo_features(&self, bin: usize, language: usize) -> SparseFeatureVector {
        let FeatureDims {
            classes, families, ..
        } = self.dims;
        let (c, f) = self.class_family(language);
        let base = 1 + classes + families;
        SparseFeatureVector::from_indices([
            0,
            1 + c,
            1 + classes + f,
            base + magnitude_bin(bin),
            base + MAX_DISTANCE + c * DIRECTED_BINS + bin,
            base + MAX_DISTANCE + classes * DIRECTED_BINS + f * DIRECTED_BINS + bin,
        ])
    }

    /// Label leaf; `None` is the bias-only empty label
    pub fn label_features(&self, label: Option<usize>) -> SparseFeatureVector {
        match label {
            Some(l) => SparseFeatureVector::from_indices([0, 1 + l]),
            None => SparseFeatureVector::from_indices([0]),
        }
    }

    /// Index of the selective typology feature of an arc, if a rule fires
    pub fn selective_index(&self, head_tag: usize, mod_tag: usize, bin: usize, language: usize) -> Option<usize> {
        let rule = SelectiveRule::matching(self.tag_class(head_tag), self.tag_class(mod_tag))?;
        let value = self.language(language)?.value(rule.feature());
        Some(self.selective_offset(rule.position()) + value * DIRECTED_BINS + bin)
    }

    /// Index of the subject/object order feature of a labeled arc, if a rule fires
    pub fn svo_index(
        &self,
        head_tag: usize,
        mod_tag: usize,
        label: Option<usize>,
        bin: usize,
        language: usize,
    ) -> Option<usize> {
        let class = self.label_class(label)?;
        let rule = SvoRule::matching(self.tag_class(head_tag), self.tag_class(mod_tag), Some(class))?;
        let value = self.language(language)?.value(rule.feature());
        Some(self.svo_offset(rule.position()) + value * 2 * DIRECTED_BINS + bin * 2 + class.is_marked() as usize)
    }

    pub(crate) fn selective_width(&self) -> usize {
        self.dims.selective_kinds().iter().sum()
    }

    pub(crate) fn selective_offset(&self, position: usize) -> usize {
        starts(&self.dims.selective_kinds())[position]
    }

    pub(crate) fn svo_offset(&self, position: usize) -> usize {
        starts(&self.dims.svo_kinds())[position]
    }

    /// Feature vector of an arc-dependent role
    pub fn arc_features(
        &self,
        role: NodeRole,
        sent: &EncodedSentence,
        head: usize,
        modifier: usize,
        label: Option<usize>,
    ) -> SparseFeatureVector {
        let (ht, mt) = (sent.tags[head], sent.tags[modifier]);
        let bin = arc_bin(head, modifier);
        let lang = sent.language;

        match role {
            NodeRole::Typo => self
                .selective_index(ht, mt, bin, lang)
                .map(|i| (i, 1.0))
                .into_iter()
                .collect(),
            NodeRole::ArcLabel => self
                .svo_index(ht, mt, label, bin, lang)
                .map(|i| (i, 1.0))
                .into_iter()
                .collect(),
            NodeRole::AllTypo => {
                let mut fv = SparseFeatureVector::from_indices([0]);
                if let Some(i) = self.selective_index(ht, mt, bin, lang) {
                    fv.push(1 + i, 1.0);
                }
                if self.learn_label {
                    if let Some(i) = self.svo_index(ht, mt, label, bin, lang) {
                        fv.push(1 + self.selective_width() + i, 1.0);
                    }
                }
                fv
            }
            _ => SparseFeatureVector::new(),
        }
    }

    /// Feature vector read by a node of `role` for the arc `head → modifier`
    pub fn features(
        &self,
        role: NodeRole,
        sent: &EncodedSentence,
        head: usize,
        modifier: usize,
        label: Option<usize>,
    ) -> SparseFeatureVector {
        match Dependence::of(role) {
            Some(Dependence::Head) => self.token_features(role, sent, head),
            Some(Dependence::Modifier) => self.token_features(role, sent, modifier),
            Some(Dependence::Distance) => {
                let bin = arc_bin(head, modifier);
                if role == NodeRole::DistanceTypo {
                    self.distance_typo_features(bin, sent.language)
                } else {
                    self.distance_features(bin)
                }
            }
            Some(Dependence::Label) => self.label_features(label),
            Some(Dependence::Arc) => self.arc_features(role, sent, head, modifier, label),
            None => SparseFeatureVector::new(),
        }
    }

    /// Mark every feature the gold tree of `sent` reads as active.
    ///
    /// Head contexts are marked at every token, the other roles at the gold
    /// arcs only.
    pub fn mark_instance(&self, tree: &mut ParameterNode, sent: &EncodedSentence) -> FeatureResult<()> {
        if tree.feature_size() > 0 {
            let role = tree.role();
            if role == NodeRole::HeadContext {
                for i in 0..sent.len() {
                    tree.mark_active(&self.token_features(role, sent, i))?;
                }
            } else {
                for (h, m, label) in sent.arcs() {
                    let label = if self.learn_label { label } else { None };
                    tree.mark_active(&self.features(role, sent, h, m, label))?;
                }
            }
        }
        for child in tree.children_mut() {
            self.mark_instance(child, sent)?;
        }
        Ok(())
    }

    /// Fail if any node of `tree` disagrees with the widths of this encoder
    pub fn check_tree(&self, tree: &ParameterNode) -> FeatureResult<()> {
        tree.expect_kinds(&self.kinds(tree.role()))?;
        tree.children().iter().try_for_each(|c| self.check_tree(c))
    }
}

impl FeatureSchema for FeatureEncoder {
    fn kinds(&self, role: NodeRole) -> Vec<usize> {
        let FeatureDims {
            tags: p,
            labels,
            classes: c,
            families: f,
            embedding,
            ..
        } = self.dims;
        let d = MAX_DISTANCE;

        match role {
            NodeRole::Root | NodeRole::LexicalPair => Vec::new(),
            NodeRole::HeadLexical | NodeRole::ModLexical => vec![1, embedding],
            NodeRole::HeadWindow | NodeRole::ModWindow => vec![1, p, p, p, p * p, p * p],
            NodeRole::HeadPos | NodeRole::ModPos => vec![1, p],
            NodeRole::HeadContext | NodeRole::ModContext if self.typed_contexts() => {
                vec![1, c * p, f * p, c * p, f * p]
            }
            NodeRole::HeadContext | NodeRole::ModContext => vec![1, p, p],
            NodeRole::Distance => vec![1, 2 * d],
            NodeRole::DistanceTypo => vec![1, c, f, d, c * 2 * d, f * 2 * d],
            NodeRole::Label => vec![1, labels],
            NodeRole::Typo => self.dims.selective_kinds(),
            NodeRole::ArcLabel => self.dims.svo_kinds(),
            NodeRole::AllTypo => {
                let mut kinds = vec![1];
                kinds.extend(self.dims.selective_kinds());
                if self.learn_label {
                    kinds.extend(self.dims.svo_kinds());
                }
                kinds
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenparse_core::{OptimizerKind, TreeShape};

    const TABLE: &str = "2 5 2\n2 2 2 2 2\nen 0 0 0 1 0 0\nja 1 1 1 0 1 1\n";

    fn corpus() -> Vec<Sentence> {
        vec![
            Sentence::from_tokens(
                "en",
                &[
                    ("dogs", "NOUN", 2, "nsubj"),
                    ("chase", "VERB", 0, "root"),
                    ("cats", "NOUN", 2, "obj"),
                ],
            ),
            Sentence::from_tokens(
                "ja",
                &[("inu", "NOUN", 3, "nmod"), ("ni", "ADP", 1, "case"), ("hoeru", "VERB", 0, "root")],
            ),
        ]
    }

    fn encoder(config: &ParserConfig) -> FeatureEncoder {
        let vocab = Vocabulary::build(&corpus());
        FeatureEncoder::new(config, vocab, Some(Typology::parse(TABLE).unwrap()), None).unwrap()
    }

    #[test]
    fn test_every_vector_fits_its_kinds() {
        let config = ParserConfig::hierarchical().learn_label(true);
        let enc = encoder(&config);
        for sentence in corpus() {
            let sent = enc.encode(&sentence).unwrap();
            for role in [
                NodeRole::HeadContext,
                NodeRole::ModContext,
                NodeRole::HeadPos,
                NodeRole::ModPos,
                NodeRole::DistanceTypo,
                NodeRole::Label,
                NodeRole::Typo,
                NodeRole::ArcLabel,
            ] {
                let size: usize = enc.kinds(role).iter().sum();
                for h in 0..sent.len() {
                    for m in 1..sent.len() {
                        if h == m {
                            continue;
                        }
                        for label in [None, Some(0), Some(2)] {
                            let fv = enc.features(role, &sent, h, m, label);
                            assert!(fv.max_index().map_or(true, |i| i < size), "{:?}", role);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_selective_and_svo_rules() {
        let config = ParserConfig::hierarchical().learn_label(true);
        let enc = encoder(&config);
        let sent = enc.encode(&corpus()[0]).unwrap();
        // chase -> cats: VERB -> NOUN labeled obj, modifier right of head
        let obj = enc.vocab().label_id("obj");
        let svo = enc.arc_features(NodeRole::ArcLabel, &sent, 2, 3, obj);
        assert_eq!(svo.len(), 1);
        // English has VO value 0
        let vo = enc.dims().typo_values[TypoFeature::Sv.column()] * 4 * MAX_DISTANCE * 2;
        assert_eq!(svo.indices()[0], vo + arc_bin(2, 3) * 2);
        assert!(enc.arc_features(NodeRole::ArcLabel, &sent, 2, 3, None).is_empty());
        assert!(enc.arc_features(NodeRole::Typo, &sent, 2, 3, obj).is_empty());
    }

    #[test]
    fn test_mark_instance_over_gold_arcs() {
        let config = ParserConfig::multiway().rank(2).learn_label(true);
        let enc = encoder(&config);
        let shape = TreeShape::build(&config, &enc).unwrap();
        let mut tree = ParameterNode::from_shape(&shape, OptimizerKind::AdaGrad).unwrap();
        let sent = enc.encode(&corpus()[0]).unwrap();
        enc.mark_instance(&mut tree, &sent).unwrap();
        enc.check_tree(&tree).unwrap();

        let nodes = tree.preorder();
        let head_pos = nodes.iter().find(|n| n.role() == NodeRole::HeadPos).unwrap();
        let verb = enc.vocab().tag_id("VERB");
        assert!(head_pos.is_active(0));
        assert!(head_pos.is_active(1 + verb));
        assert!(!head_pos.is_active(1 + enc.vocab().tag_id("ADP")));

        let context = nodes.iter().find(|n| n.role() == NodeRole::HeadContext).unwrap();
        // previous tags: start, root, NOUN, VERB; next tags: NOUN, VERB, end
        assert_eq!(context.active_count(), 1 + 4 + 3);
    }

    #[test]
    fn test_missing_typology_rejected() {
        let vocab = Vocabulary::build(&corpus());
        let err = FeatureEncoder::new(&ParserConfig::hierarchical(), vocab.clone(), None, None).unwrap_err();
        assert!(matches!(err, FeatureError::MissingTypology(_)));
        assert!(FeatureEncoder::new(&ParserConfig::threeway(), vocab, None, None).is_ok());
    }
}
