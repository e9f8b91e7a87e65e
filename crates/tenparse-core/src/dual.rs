//! Forward/backward walk over a parameter-tree layout
//!
//! Every node of a [`TreeLayout`] carries a vector of `lanes · multiplicity`
//! values. A forward pass fills them bottom-up:
//!
//! - a leaf takes the vector supplied by the caller (typically `W·fv`),
//! - a [`Combine::Product`] node multiplies its children element-wise,
//! - a [`Combine::BlockedDot`] node folds each block of `extra` values of its
//!   two children into one lane,
//! - a node with its own features adds its own vector to the combined children.
//!
//! The backward pass computes, for every node, the derivative of the sum of the
//! root lanes with respect to that node's values. For a node owning features the
//! gradient of factor row `i` is then `adjoint[i] · fv`.
//!
//! The same walk scores arcs (`lanes = rank`) and drives the rank-1 power
//! iteration of the decomposition (`lanes = 1`).

use crate::error::{TensorError, TensorResult};
use crate::shape::{Combine, TreeLayout};

/// Per-node input to a forward pass
#[derive(Debug, Clone, Copy)]
pub enum Term<'a> {
    /// Use these values as-is and do not visit the children
    Leaf(&'a [f64]),
    /// Combine the children, then add these values
    Sum(&'a [f64]),
    /// Combine the children only
    Children,
}

/// Values and adjoints of one walk
#[derive(Debug, Clone)]
pub struct DualTrace {
    values: Vec<Vec<f64>>,
    adjoints: Vec<Vec<f64>>,
    reached: Vec<bool>,
    expanded: Vec<bool>,
}

impl DualTrace {
    pub fn new(layout: &TreeLayout) -> Self {
        let widths: Vec<usize> = (0..layout.len()).map(|id| layout.width(id)).collect();
        Self {
            values: widths.iter().map(|&w| vec![0.0; w]).collect(),
            adjoints: widths.iter().map(|&w| vec![0.0; w]).collect(),
            reached: vec![false; layout.len()],
            expanded: vec![false; layout.len()],
        }
    }

    /// Run the forward pass and return the sum of the root lanes.
    ///
    /// `term` is asked once for every node that is reached.
    pub fn forward<'a, F>(&mut self, layout: &TreeLayout, mut term: F) -> TensorResult<f64>
    where
        F: FnMut(usize) -> TensorResult<Term<'a>>,
    {
        if layout.len() != self.values.len() {
            return Err(TensorError::ShapeMismatch(format!(
                "trace has {} nodes, layout has {}",
                self.values.len(),
                layout.len()
            )));
        }
        self.reached.iter_mut().for_each(|r| *r = false);
        self.expanded.iter_mut().for_each(|e| *e = false);
        if layout.is_empty() {
            return Ok(0.0);
        }
        self.eval(layout, 0, &mut term)?;
        Ok(self.values[0].iter().sum())
    }

    fn eval<'a, F>(&mut self, layout: &TreeLayout, id: usize, term: &mut F) -> TensorResult<()>
    where
        F: FnMut(usize) -> TensorResult<Term<'a>>,
    {
        let width = layout.width(id);
        self.reached[id] = true;

        let own = match term(id)? {
            Term::Leaf(values) => {
                check_width(layout, id, values.len(), width)?;
                self.values[id].copy_from_slice(values);
                return Ok(());
            }
            Term::Sum(values) => {
                check_width(layout, id, values.len(), width)?;
                Some(values)
            }
            Term::Children => None,
        };

        let node = layout.node(id);
        if node.is_leaf() {
            return Err(TensorError::ShapeMismatch(format!(
                "leaf {:?} needs explicit values",
                node.role
            )));
        }
        for &child in &node.children {
            self.eval(layout, child, term)?;
        }
        self.expanded[id] = true;

        let mut acc = std::mem::take(&mut self.values[id]);
        match node.combine {
            Combine::Product => {
                acc.iter_mut().for_each(|v| *v = 1.0);
                for &child in &node.children {
                    let cv = &self.values[child];
                    check_width(layout, child, cv.len(), width)?;
                    for (a, c) in acc.iter_mut().zip(cv) {
                        *a *= c;
                    }
                }
            }
            Combine::BlockedDot { extra } => {
                let (c0, c1) = blocked_pair(layout, id, extra)?;
                let (v0, v1) = (&self.values[c0], &self.values[c1]);
                for (r, a) in acc.iter_mut().enumerate() {
                    let block = r * extra..(r + 1) * extra;
                    *a = v0[block.clone()]
                        .iter()
                        .zip(&v1[block])
                        .map(|(x, y)| x * y)
                        .sum();
                }
            }
        }
        if let Some(own) = own {
            for (a, o) in acc.iter_mut().zip(own) {
                *a += o;
            }
        }
        self.values[id] = acc;
        Ok(())
    }

    /// Propagate `seed · ∂(Σ root lanes)` down to every reached node.
    ///
    /// Must follow a successful [`forward`](Self::forward) on the same layout.
    pub fn backward(&mut self, layout: &TreeLayout, seed: f64) -> TensorResult<()> {
        for adj in &mut self.adjoints {
            adj.iter_mut().for_each(|a| *a = 0.0);
        }
        if layout.is_empty() || !self.reached[0] {
            return Ok(());
        }
        self.adjoints[0].iter_mut().for_each(|a| *a = seed);

        // Preorder: a parent's adjoint is complete before its children are visited.
        for id in 0..layout.len() {
            if !self.expanded[id] {
                continue;
            }
            let node = layout.node(id);
            let adj = std::mem::take(&mut self.adjoints[id]);
            match node.combine {
                Combine::Product => {
                    for (pos, &child) in node.children.iter().enumerate() {
                        let mut out = std::mem::take(&mut self.adjoints[child]);
                        for (lane, o) in out.iter_mut().enumerate() {
                            let others: f64 = node
                                .children
                                .iter()
                                .enumerate()
                                .filter(|&(p, _)| p != pos)
                                .map(|(_, &c)| self.values[c][lane])
                                .product();
                            *o = adj[lane] * others;
                        }
                        self.adjoints[child] = out;
                    }
                }
                Combine::BlockedDot { extra } => {
                    let (c0, c1) = blocked_pair(layout, id, extra)?;
                    let mut out0 = std::mem::take(&mut self.adjoints[c0]);
                    let mut out1 = std::mem::take(&mut self.adjoints[c1]);
                    for (r, a) in adj.iter().enumerate() {
                        for i in r * extra..(r + 1) * extra {
                            out0[i] = a * self.values[c1][i];
                            out1[i] = a * self.values[c0][i];
                        }
                    }
                    self.adjoints[c0] = out0;
                    self.adjoints[c1] = out1;
                }
            }
            self.adjoints[id] = adj;
        }
        Ok(())
    }

    /// Forward values of node `id`
    pub fn value(&self, id: usize) -> &[f64] {
        &self.values[id]
    }

    /// Adjoint of node `id` after [`backward`](Self::backward)
    pub fn adjoint(&self, id: usize) -> &[f64] {
        &self.adjoints[id]
    }

    /// True if the last forward pass asked for node `id`
    pub fn reached(&self, id: usize) -> bool {
        self.reached[id]
    }
}

fn check_width(layout: &TreeLayout, id: usize, found: usize, expected: usize) -> TensorResult<()> {
    if found != expected {
        return Err(TensorError::ShapeMismatch(format!(
            "{:?} node carries {} values, expected {}",
            layout.node(id).role,
            found,
            expected
        )));
    }
    Ok(())
}

fn blocked_pair(layout: &TreeLayout, id: usize, extra: usize) -> TensorResult<(usize, usize)> {
    match layout.node(id).children.as_slice() {
        &[c0, c1] if layout.width(c0) == layout.width(id) * extra
            && layout.width(c1) == layout.width(id) * extra =>
        {
            Ok((c0, c1))
        }
        _ => Err(TensorError::ShapeMismatch(format!(
            "{:?} blocked dot needs two children of width {}",
            layout.node(id).role,
            layout.width(id) * extra
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{FeatureSchema, NodeRole, TreeShape};
    use crate::ParserConfig;

    struct Unit;

    impl FeatureSchema for Unit {
        fn kinds(&self, role: NodeRole) -> Vec<usize> {
            match role {
                NodeRole::Root | NodeRole::LexicalPair => vec![],
                _ => vec![2],
            }
        }
    }

    #[test]
    fn test_product_and_sum() {
        // Hierarchical, no labels: Root × [HC, MC, Typo(+own) × [HP, MP, DT]]
        let config = ParserConfig::hierarchical().rank(1);
        let layout = TreeShape::build(&config, &Unit).unwrap().layout(1);
        let inputs = [
            vec![],
            vec![2.0],
            vec![3.0],
            vec![0.5],
            vec![1.0],
            vec![4.0],
            vec![-1.0],
        ];
        let mut trace = DualTrace::new(&layout);
        let score = trace
            .forward(&layout, |id| {
                Ok(match id {
                    0 => Term::Children,
                    3 => Term::Sum(&inputs[3]),
                    _ => Term::Leaf(&inputs[id]),
                })
            })
            .unwrap();
        // 2 · 3 · (0.5 + 1 · 4 · −1)
        assert_eq!(score, -21.0);

        trace.backward(&layout, 1.0).unwrap();
        assert_eq!(trace.adjoint(3), &[6.0]);
        assert_eq!(trace.adjoint(1), &[-10.5]);
        assert_eq!(trace.adjoint(6), &[24.0]);
    }

    #[test]
    fn test_leaf_cuts_subtree() {
        let config = ParserConfig::hierarchical().rank(1);
        let layout = TreeShape::build(&config, &Unit).unwrap().layout(1);
        let mut trace = DualTrace::new(&layout);
        let one = [1.0];
        let two = [2.0];
        let score = trace
            .forward(&layout, |id| {
                Ok(match id {
                    0 => Term::Children,
                    3 => Term::Leaf(&two),
                    _ => Term::Leaf(&one),
                })
            })
            .unwrap();
        assert_eq!(score, 2.0);
        assert!(!trace.reached(4));
        trace.backward(&layout, 1.0).unwrap();
        assert_eq!(trace.adjoint(4), &[0.0]);
    }

    #[test]
    fn test_blocked_dot() {
        let config = ParserConfig::threeway().rank(2).lexical(true).extra_rank(2);
        let layout = TreeShape::build(&config, &Unit).unwrap().layout(2);
        // 0 Root, 1 LexicalPair, 2 HeadLexical, 3 ModLexical, 4 HW, 5 MW, 6 Dist
        let head = [1.0, 2.0, 3.0, 4.0];
        let modifier = [5.0, 6.0, 7.0, 8.0];
        let ones = [1.0, 1.0];
        let mut trace = DualTrace::new(&layout);
        let score = trace
            .forward(&layout, |id| {
                Ok(match id {
                    0 | 1 => Term::Children,
                    2 => Term::Leaf(&head),
                    3 => Term::Leaf(&modifier),
                    _ => Term::Leaf(&ones),
                })
            })
            .unwrap();
        assert_eq!(trace.value(1), &[17.0, 53.0]);
        assert_eq!(score, 70.0);

        trace.backward(&layout, 2.0).unwrap();
        assert_eq!(trace.adjoint(2), &[10.0, 12.0, 14.0, 16.0]);
        assert_eq!(trace.adjoint(3), &[2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_width_mismatch() {
        let config = ParserConfig::threeway().rank(2);
        let layout = TreeShape::build(&config, &Unit).unwrap().layout(2);
        let short = [1.0];
        let mut trace = DualTrace::new(&layout);
        let result = trace.forward(&layout, |id| {
            Ok(if id == 0 { Term::Children } else { Term::Leaf(&short) })
        });
        assert!(matches!(result, Err(TensorError::ShapeMismatch(_))));
    }
}
