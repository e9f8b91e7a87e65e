//! Tree-shape descriptor
//!
//! The multiplicative structure of the arc scoring function is fixed once per
//! run. [`TreeShape::build`] turns a [`ParserConfig`] plus the feature widths
//! reported by a [`FeatureSchema`] into a tree of [`ShapeNode`]s; the parameter
//! tree, the per-sentence composition engine and the decomposition sweep plan
//! are all derived from it, so they cannot drift apart.
//!
//! Trees per mode (`×` = Hadamard product of children, `+own` = the node's own
//! features are added to that product):
//!
//! ```text
//! Threeway          Root × [Lex?, HeadWindow, ModWindow, Distance, Label?]
//! Multiway          Root × [Lex?, HeadPos, ModPos, HeadContext, ModContext, Distance, Label?]
//! Hierarchical      Root × [Lex?, HeadContext, ModContext, Arc]
//!                     Arc = ArcLabel(+own SVO) × [Label, Typo]      (with labels)
//!                     Arc = Typo                                     (without)
//!                     Typo(+own selective typology) × [HeadPos, ModPos, DistanceTypo]
//! ExtendedMultiway  Root × [Lex?, HeadPos, ModPos, HeadContext, ModContext,
//!                           AllTypo, DistanceTypo, Label?]
//! Lex               LexicalPair ·blocked-dot· [HeadLexical, ModLexical]
//! ```
//!
//! [`TreeLayout`] flattens a tree in preorder with parent/children indices and
//! is what the dual tree walk iterates over.

use serde::{Deserialize, Serialize};

use crate::config::{ParserConfig, TensorMode};
use crate::error::{TensorError, TensorResult};

/// What a node of the parameter tree represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    Root,
    LexicalPair,
    HeadLexical,
    ModLexical,
    HeadWindow,
    ModWindow,
    HeadPos,
    ModPos,
    HeadContext,
    ModContext,
    Distance,
    DistanceTypo,
    Label,
    Typo,
    ArcLabel,
    AllTypo,
}

impl NodeRole {
    /// Roles whose features depend on a single token of the sentence
    pub fn is_token_role(self) -> bool {
        matches!(
            self,
            NodeRole::HeadLexical
                | NodeRole::ModLexical
                | NodeRole::HeadWindow
                | NodeRole::ModWindow
                | NodeRole::HeadPos
                | NodeRole::ModPos
                | NodeRole::HeadContext
                | NodeRole::ModContext
        )
    }

    /// True for token roles read at the head position
    pub fn reads_head(self) -> bool {
        matches!(
            self,
            NodeRole::HeadLexical | NodeRole::HeadWindow | NodeRole::HeadPos | NodeRole::HeadContext
        )
    }

    /// Roles whose features depend on the whole arc (tags, label, distance)
    pub fn is_arc_role(self) -> bool {
        matches!(self, NodeRole::Typo | NodeRole::ArcLabel | NodeRole::AllTypo)
    }
}

/// How a node combines its children's per-rank vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Combine {
    /// Element-wise product of all children
    Product,
    /// Two children of width `R·extra`; lane `r` is `Σ_k a[r·extra+k]·b[r·extra+k]`
    BlockedDot { extra: usize },
}

/// Source of the feature-kind widths of every role
pub trait FeatureSchema {
    /// Widths of the contiguous feature kinds owned by a node of `role`.
    /// Grouping roles return an empty list.
    fn kinds(&self, role: NodeRole) -> Vec<usize>;
}

/// One node of the shape descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeNode {
    pub role: NodeRole,
    pub kinds: Vec<usize>,
    pub combine: Combine,
    /// Factor rows per rank (`extra_rank` for lexical leaves, otherwise 1)
    pub multiplicity: usize,
    pub children: Vec<ShapeNode>,
}

impl ShapeNode {
    fn leaf(role: NodeRole, kinds: Vec<usize>) -> Self {
        Self {
            role,
            kinds,
            combine: Combine::Product,
            multiplicity: 1,
            children: Vec::new(),
        }
    }

    fn group(role: NodeRole, combine: Combine, children: Vec<ShapeNode>) -> Self {
        Self {
            role,
            kinds: Vec::new(),
            combine,
            multiplicity: 1,
            children,
        }
    }

    fn with_own(role: NodeRole, kinds: Vec<usize>, children: Vec<ShapeNode>) -> Self {
        Self {
            role,
            kinds,
            combine: Combine::Product,
            multiplicity: 1,
            children,
        }
    }

    pub fn feature_size(&self) -> usize {
        self.kinds.iter().sum()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Fixed shape of the parameter tree for one run
#[derive(Debug, Clone, PartialEq)]
pub struct TreeShape {
    pub mode: TensorMode,
    pub rank: usize,
    pub extra_rank: usize,
    pub learn_label: bool,
    pub lexical: bool,
    pub root: ShapeNode,
}

impl TreeShape {
    /// Build the tree for `config.tensor_mode` with widths from `schema`
    pub fn build<S: FeatureSchema + ?Sized>(config: &ParserConfig, schema: &S) -> TensorResult<Self> {
        if config.rank == 0 {
            return Err(TensorError::InvalidRank(config.rank));
        }
        if config.extra_rank == 0 {
            return Err(TensorError::InvalidConfig(
                "extra_rank must be at least 1".to_string(),
            ));
        }

        let leaf = |role| ShapeNode::leaf(role, schema.kinds(role));
        let mut children = Vec::new();

        if config.lexical {
            let mut head = leaf(NodeRole::HeadLexical);
            let mut modifier = leaf(NodeRole::ModLexical);
            head.multiplicity = config.extra_rank;
            modifier.multiplicity = config.extra_rank;
            children.push(ShapeNode::group(
                NodeRole::LexicalPair,
                Combine::BlockedDot {
                    extra: config.extra_rank,
                },
                vec![head, modifier],
            ));
        }

        match config.tensor_mode {
            TensorMode::Threeway => {
                children.push(leaf(NodeRole::HeadWindow));
                children.push(leaf(NodeRole::ModWindow));
                children.push(leaf(NodeRole::Distance));
                if config.learn_label {
                    children.push(leaf(NodeRole::Label));
                }
            }
            TensorMode::Multiway => {
                children.push(leaf(NodeRole::HeadPos));
                children.push(leaf(NodeRole::ModPos));
                children.push(leaf(NodeRole::HeadContext));
                children.push(leaf(NodeRole::ModContext));
                children.push(leaf(NodeRole::Distance));
                if config.learn_label {
                    children.push(leaf(NodeRole::Label));
                }
            }
            TensorMode::Hierarchical => {
                let typo = ShapeNode::with_own(
                    NodeRole::Typo,
                    schema.kinds(NodeRole::Typo),
                    vec![
                        leaf(NodeRole::HeadPos),
                        leaf(NodeRole::ModPos),
                        leaf(NodeRole::DistanceTypo),
                    ],
                );
                let arc = if config.learn_label {
                    ShapeNode::with_own(
                        NodeRole::ArcLabel,
                        schema.kinds(NodeRole::ArcLabel),
                        vec![leaf(NodeRole::Label), typo],
                    )
                } else {
                    typo
                };
                children.push(leaf(NodeRole::HeadContext));
                children.push(leaf(NodeRole::ModContext));
                children.push(arc);
            }
            TensorMode::ExtendedMultiway => {
                children.push(leaf(NodeRole::HeadPos));
                children.push(leaf(NodeRole::ModPos));
                children.push(leaf(NodeRole::HeadContext));
                children.push(leaf(NodeRole::ModContext));
                children.push(leaf(NodeRole::AllTypo));
                children.push(leaf(NodeRole::DistanceTypo));
                if config.learn_label {
                    children.push(leaf(NodeRole::Label));
                }
            }
        }

        let shape = Self {
            mode: config.tensor_mode,
            rank: config.rank,
            extra_rank: config.extra_rank,
            learn_label: config.learn_label,
            lexical: config.lexical,
            root: ShapeNode::group(NodeRole::Root, Combine::Product, children),
        };
        shape.check()?;
        Ok(shape)
    }

    fn check(&self) -> TensorResult<()> {
        fn walk(node: &ShapeNode) -> TensorResult<()> {
            if node.is_leaf() && node.feature_size() == 0 {
                return Err(TensorError::ShapeMismatch(format!(
                    "leaf {:?} has no features",
                    node.role
                )));
            }
            if let Combine::BlockedDot { extra } = node.combine {
                let ok = node.children.len() == 2
                    && node.children.iter().all(|c| c.multiplicity == extra);
                if !ok {
                    return Err(TensorError::ShapeMismatch(format!(
                        "{:?} blocked dot needs two children with {} rows per rank",
                        node.role, extra
                    )));
                }
            }
            node.children.iter().try_for_each(walk)
        }
        walk(&self.root)
    }

    /// Preorder layout with `lanes` values per unit of multiplicity
    pub fn layout(&self, lanes: usize) -> TreeLayout {
        TreeLayout::from_tree(&self.root, lanes)
    }

    /// Roles in preorder
    pub fn roles(&self) -> Vec<NodeRole> {
        self.layout(1).nodes().iter().map(|n| n.role).collect()
    }
}

/// Read-only view of a tree node, implemented by shape and parameter nodes
pub trait LayoutSource {
    fn role(&self) -> NodeRole;
    fn combine(&self) -> Combine;
    fn multiplicity(&self) -> usize;
    fn feature_size(&self) -> usize;
    fn child_nodes(&self) -> &[Self]
    where
        Self: Sized;
}

impl LayoutSource for ShapeNode {
    fn role(&self) -> NodeRole {
        self.role
    }
    fn combine(&self) -> Combine {
        self.combine
    }
    fn multiplicity(&self) -> usize {
        self.multiplicity
    }
    fn feature_size(&self) -> usize {
        ShapeNode::feature_size(self)
    }
    fn child_nodes(&self) -> &[Self] {
        &self.children
    }
}

/// A node of the flattened preorder layout
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutNode {
    pub role: NodeRole,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub combine: Combine,
    pub multiplicity: usize,
    pub feature_size: usize,
}

impl LayoutNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// True if the node owns a factor matrix
    pub fn has_features(&self) -> bool {
        self.feature_size > 0
    }
}

/// Preorder flattening of a tree
#[derive(Debug, Clone, PartialEq)]
pub struct TreeLayout {
    lanes: usize,
    nodes: Vec<LayoutNode>,
}

impl TreeLayout {
    pub fn from_tree<N: LayoutSource>(root: &N, lanes: usize) -> Self {
        fn walk<N: LayoutSource>(node: &N, parent: Option<usize>, out: &mut Vec<LayoutNode>) -> usize {
            let id = out.len();
            out.push(LayoutNode {
                role: node.role(),
                parent,
                children: Vec::new(),
                combine: node.combine(),
                multiplicity: node.multiplicity(),
                feature_size: node.feature_size(),
            });
            for child in node.child_nodes() {
                let cid = walk(child, Some(id), out);
                out[id].children.push(cid);
            }
            id
        }

        let mut nodes = Vec::new();
        walk(root, None, &mut nodes);
        Self { lanes, nodes }
    }

    /// Same layout with a different lane count
    pub fn with_lanes(&self, lanes: usize) -> Self {
        Self {
            lanes,
            nodes: self.nodes.clone(),
        }
    }

    pub fn lanes(&self) -> usize {
        self.lanes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[LayoutNode] {
        &self.nodes
    }

    pub fn node(&self, id: usize) -> &LayoutNode {
        &self.nodes[id]
    }

    /// Values carried by node `id` in the tree walk
    #[inline]
    pub fn width(&self, id: usize) -> usize {
        self.lanes * self.nodes[id].multiplicity
    }

    /// Preorder id of the first node with `role`
    pub fn find(&self, role: NodeRole) -> Option<usize> {
        self.nodes.iter().position(|n| n.role == role)
    }

    /// Ids of the nodes that own a factor matrix
    pub fn feature_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.has_features())
            .map(|(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widths;

    impl FeatureSchema for Widths {
        fn kinds(&self, role: NodeRole) -> Vec<usize> {
            match role {
                NodeRole::Root | NodeRole::LexicalPair => vec![],
                NodeRole::Typo | NodeRole::ArcLabel => vec![4, 4],
                _ => vec![1, 3],
            }
        }
    }

    #[test]
    fn test_hierarchical_with_labels() {
        let config = ParserConfig::hierarchical().rank(4).learn_label(true);
        let shape = TreeShape::build(&config, &Widths).unwrap();
        assert_eq!(
            shape.roles(),
            vec![
                NodeRole::Root,
                NodeRole::HeadContext,
                NodeRole::ModContext,
                NodeRole::ArcLabel,
                NodeRole::Label,
                NodeRole::Typo,
                NodeRole::HeadPos,
                NodeRole::ModPos,
                NodeRole::DistanceTypo,
            ]
        );
        let layout = shape.layout(4);
        let typo = layout.find(NodeRole::Typo).unwrap();
        assert_eq!(layout.node(typo).children.len(), 3);
        assert_eq!(layout.node(typo).feature_size, 8);
        assert_eq!(layout.node(typo).parent, layout.find(NodeRole::ArcLabel));
    }

    #[test]
    fn test_lexical_pair_multiplicity() {
        let config = ParserConfig::multiway().rank(3).lexical(true).extra_rank(2);
        let shape = TreeShape::build(&config, &Widths).unwrap();
        let layout = shape.layout(3);
        let pair = layout.find(NodeRole::LexicalPair).unwrap();
        assert_eq!(layout.node(pair).combine, Combine::BlockedDot { extra: 2 });
        assert_eq!(layout.width(pair), 3);
        let head = layout.find(NodeRole::HeadLexical).unwrap();
        assert_eq!(layout.width(head), 6);
        assert_eq!(layout.feature_nodes().count(), 7);
    }

    #[test]
    fn test_empty_leaf_rejected() {
        struct NoLabels;
        impl FeatureSchema for NoLabels {
            fn kinds(&self, role: NodeRole) -> Vec<usize> {
                match role {
                    NodeRole::Label => vec![],
                    _ => vec![1, 2],
                }
            }
        }
        let config = ParserConfig::threeway().learn_label(true);
        assert!(matches!(
            TreeShape::build(&config, &NoLabels),
            Err(TensorError::ShapeMismatch(_))
        ));
    }
}
