//! Sweep plans
//!
//! One power-iteration sweep re-estimates every node that owns features, in a
//! fixed order, each followed by a normalization to a target norm. The last
//! node of the sweep keeps its norm: it carries the magnitude of the rank-1
//! component and is monitored for convergence.
//!
//! The flat modes (Threeway, Multiway, ExtendedMultiway) sweep in preorder
//! with unit targets. The hierarchical tree sweeps the typology subtree first
//! and the contexts last, with targets that split the magnitude between the
//! multiplicative and additive branches:
//!
//! ```text
//! a = 1/3 (labels) or 1     svo target
//! l = sqrt(1 − a)            label target
//! t = l / 2                  typology target
//! h = cbrt(l − t)            head, modifier, distance targets
//! ```
//!
//! and after convergence rescales the two context vectors to equal norms.

use tenparse_core::{NodeRole, TensorMode, TreeLayout};

use crate::error::{DecompError, DecompResult};

/// Normalization applied after a node is re-estimated
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Target {
    /// Scale every factor row to this norm
    Norm(f64),
    /// Keep the norm and watch it for convergence
    Monitor,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepStep {
    /// Preorder id of the node
    pub node: usize,
    pub role: NodeRole,
    /// Factor rows per rank
    pub rows: usize,
    pub target: Target,
}

/// Order, targets and balancing of one power-iteration sweep
#[derive(Debug, Clone, PartialEq)]
pub struct SweepPlan {
    steps: Vec<SweepStep>,
    balance: Option<(usize, usize)>,
}

impl SweepPlan {
    /// Plan for a tree of `mode` laid out as `layout`
    pub fn new(mode: TensorMode, layout: &TreeLayout) -> DecompResult<Self> {
        let lexical_norm = |id: usize| (1.0 / layout.node(id).multiplicity as f64).sqrt();
        let find = |role: NodeRole| {
            layout
                .find(role)
                .ok_or_else(|| DecompError::PlanMismatch(format!("{:?} tree has no {:?} node", mode, role)))
        };

        let mut order: Vec<(usize, Target)> = Vec::new();
        let mut balance = None;
        match mode {
            TensorMode::Hierarchical => {
                let labels = layout.find(NodeRole::Label).is_some();
                let norm_svo: f64 = if labels { 1.0 / 3.0 } else { 1.0 };
                let norm_label = if labels { (1.0 - norm_svo).sqrt() } else { 1.0 };
                let norm_typo = norm_label / 2.0;
                let norm_leaf = (norm_label - norm_typo).cbrt();

                for role in [NodeRole::HeadLexical, NodeRole::ModLexical] {
                    if let Some(id) = layout.find(role) {
                        order.push((id, Target::Norm(lexical_norm(id))));
                    }
                }
                for role in [NodeRole::HeadPos, NodeRole::ModPos, NodeRole::DistanceTypo] {
                    order.push((find(role)?, Target::Norm(norm_leaf)));
                }
                order.push((find(NodeRole::Typo)?, Target::Norm(norm_typo)));
                if labels {
                    order.push((find(NodeRole::ArcLabel)?, Target::Norm(norm_svo)));
                    order.push((find(NodeRole::Label)?, Target::Norm(norm_label)));
                }
                let head = find(NodeRole::HeadContext)?;
                let modifier = find(NodeRole::ModContext)?;
                order.push((head, Target::Norm(1.0)));
                order.push((modifier, Target::Monitor));
                balance = Some((head, modifier));
            }
            TensorMode::Threeway | TensorMode::Multiway | TensorMode::ExtendedMultiway => {
                let required: &[NodeRole] = match mode {
                    TensorMode::Threeway => &[NodeRole::HeadWindow, NodeRole::ModWindow, NodeRole::Distance],
                    TensorMode::Multiway => &[NodeRole::HeadPos, NodeRole::ModPos, NodeRole::Distance],
                    _ => &[NodeRole::AllTypo, NodeRole::DistanceTypo],
                };
                for &role in required {
                    find(role)?;
                }
                for id in layout.feature_nodes() {
                    let target = match layout.node(id).role {
                        NodeRole::HeadLexical | NodeRole::ModLexical => Target::Norm(lexical_norm(id)),
                        _ => Target::Norm(1.0),
                    };
                    order.push((id, target));
                }
                if let Some(last) = order.last_mut() {
                    last.1 = Target::Monitor;
                }
            }
        }

        let planned: Vec<usize> = order.iter().map(|&(id, _)| id).collect();
        if let Some(missing) = layout.feature_nodes().find(|id| !planned.contains(id)) {
            return Err(DecompError::PlanMismatch(format!(
                "{:?} node is not swept in {:?} mode",
                layout.node(missing).role,
                mode
            )));
        }

        let steps = order
            .into_iter()
            .map(|(node, target)| SweepStep {
                node,
                role: layout.node(node).role,
                rows: layout.node(node).multiplicity,
                target,
            })
            .collect();
        Ok(Self { steps, balance })
    }

    pub fn steps(&self) -> &[SweepStep] {
        &self.steps
    }

    /// The step whose norm decides convergence
    pub fn monitor(&self) -> Option<&SweepStep> {
        self.steps.iter().find(|s| s.target == Target::Monitor)
    }

    /// Context pair rescaled to equal norms after convergence
    pub fn balance(&self) -> Option<(usize, usize)> {
        self.balance
    }
}
