//! Binary persistence of parameter trees
//!
//! File layout:
//!
//! ```text
//! "TNPM" | version: u32 (LE) | bincode(standard) payload of the node snapshot tree
//! ```
//!
//! Factors, masks and optimizer state are stored, including the training
//! factors kept aside while averaged MIRA parameters are swapped in. Gradient
//! accumulators are transient and are not.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use scirs2_core::ndarray_ext::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{TensorError, TensorResult};
use crate::param::{OptimizerState, OwnedParts, ParameterNode};
use crate::shape::{Combine, NodeRole};

const MAGIC: &[u8; 4] = b"TNPM";
const VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
enum OptimizerSnapshot {
    AdaGrad { sum_squares: Vec<f64> },
    Mira {
        margin_bound: f64,
        running_total: Vec<f64>,
        backup: Option<Vec<f64>>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct NodeSnapshot {
    role: NodeRole,
    combine: Combine,
    multiplicity: usize,
    rank: usize,
    kinds: Vec<usize>,
    factors: Vec<f64>,
    active: Vec<bool>,
    optimizer: OptimizerSnapshot,
    children: Vec<NodeSnapshot>,
}

fn flatten(matrix: &Array2<f64>) -> Vec<f64> {
    matrix.iter().copied().collect()
}

fn unflatten(role: NodeRole, rows: usize, cols: usize, data: Vec<f64>) -> TensorResult<Array2<f64>> {
    Array2::from_shape_vec((rows, cols), data).map_err(|e| {
        TensorError::Persist(format!("{:?} node: bad matrix of {}x{}: {}", role, rows, cols, e))
    })
}

impl NodeSnapshot {
    fn capture(node: &ParameterNode) -> TensorResult<Self> {
        let parts = node.parts();
        let optimizer = match parts.optimizer {
            OptimizerState::AdaGrad { sum_squares } => OptimizerSnapshot::AdaGrad {
                sum_squares: flatten(sum_squares),
            },
            OptimizerState::Mira {
                margin_bound,
                running_total,
                backup,
            } => OptimizerSnapshot::Mira {
                margin_bound: *margin_bound,
                running_total: flatten(running_total),
                backup: backup.as_ref().map(flatten),
            },
        };

        Ok(Self {
            role: parts.role,
            combine: parts.combine,
            multiplicity: parts.multiplicity,
            rank: parts.rank,
            kinds: parts.kinds.to_vec(),
            factors: flatten(parts.factors),
            active: parts.active.to_vec(),
            optimizer,
            children: node
                .children()
                .iter()
                .map(NodeSnapshot::capture)
                .collect::<TensorResult<_>>()?,
        })
    }

    fn restore(self) -> TensorResult<ParameterNode> {
        let cols: usize = self.kinds.iter().sum();
        let rows = self.rank;
        let optimizer = match self.optimizer {
            OptimizerSnapshot::AdaGrad { sum_squares } => OptimizerState::AdaGrad {
                sum_squares: unflatten(self.role, rows, cols, sum_squares)?,
            },
            OptimizerSnapshot::Mira {
                margin_bound,
                running_total,
                backup,
            } => OptimizerState::Mira {
                margin_bound,
                running_total: unflatten(self.role, rows, cols, running_total)?,
                backup: backup
                    .map(|b| unflatten(self.role, rows, cols, b))
                    .transpose()?,
            },
        };
        let children = self
            .children
            .into_iter()
            .map(NodeSnapshot::restore)
            .collect::<TensorResult<Vec<_>>>()?;

        ParameterNode::from_parts(
            OwnedParts {
                role: self.role,
                combine: self.combine,
                multiplicity: self.multiplicity,
                rank: self.rank,
                factors: unflatten(self.role, rows, cols, self.factors)?,
                kinds: self.kinds,
                active: self.active,
                optimizer,
            },
            children,
        )
    }
}

impl ParameterNode {
    /// Serialize the whole tree into `writer`
    pub fn save_to<W: Write>(&self, mut writer: W) -> TensorResult<()> {
        let snapshot = NodeSnapshot::capture(self)?;
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        bincode::serde::encode_into_std_write(&snapshot, &mut writer, bincode::config::standard())
            .map_err(|e| TensorError::Persist(e.to_string()))?;
        writer.flush()?;
        Ok(())
    }

    /// Deserialize a tree written by [`save_to`](Self::save_to)
    pub fn load_from<R: Read>(mut reader: R) -> TensorResult<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(TensorError::Persist("invalid magic bytes".to_string()));
        }
        let mut version = [0u8; 4];
        reader.read_exact(&mut version)?;
        let version = u32::from_le_bytes(version);
        if version != VERSION {
            return Err(TensorError::Persist(format!(
                "unsupported version: {}",
                version
            )));
        }

        let snapshot: NodeSnapshot =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
                .map_err(|e| TensorError::Persist(e.to_string()))?;
        let tree = snapshot.restore()?;
        log::debug!(
            "loaded parameter tree: {} nodes, rank {}",
            tree.node_count(),
            tree.rank()
        );
        Ok(tree)
    }

    pub fn to_bytes(&self) -> TensorResult<Vec<u8>> {
        let mut out = Vec::new();
        self.save_to(&mut out)?;
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> TensorResult<Self> {
        Self::load_from(bytes)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> TensorResult<()> {
        self.save_to(BufWriter::new(File::create(path)?))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> TensorResult<Self> {
        Self::load_from(BufReader::new(File::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::OptimizerKind;
    use crate::sparse::SparseFeatureVector;
    use scirs2_core::random::{rngs::StdRng, SeedableRng};

    fn tree(kind: OptimizerKind) -> ParameterNode {
        let mut root = ParameterNode::new(NodeRole::Root, 2, kind);
        let mut leaf = ParameterNode::new(NodeRole::HeadPos, 2, kind);
        leaf.allocate(&[1, 3]).unwrap();
        leaf.mark_active(&SparseFeatureVector::from_indices([0, 2])).unwrap();
        root.add_child(leaf);
        root.random_init(1.0, &mut StdRng::seed_from_u64(3));
        root
    }

    #[test]
    fn test_bytes_preserve_tree() {
        let mut original = tree(OptimizerKind::AdaGrad);
        original.children_mut()[0]
            .add_gradient(1, &SparseFeatureVector::from_indices([2]), 1.0)
            .unwrap();
        original.apply_adagrad(0.1, 1e-5).unwrap();

        let loaded = ParameterNode::from_bytes(&original.to_bytes().unwrap()).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_averaged_tree_keeps_backup() {
        let mut t = tree(OptimizerKind::Mira { margin_bound: 1.0 });
        t.children_mut()[0]
            .add_gradient(0, &SparseFeatureVector::from_indices([0]), 1.0)
            .unwrap();
        t.apply_mira(0.5, 1).unwrap();
        let training = t.children()[0].factors().clone();
        t.average_for_evaluation(1).unwrap();

        let mut loaded = ParameterNode::from_bytes(&t.to_bytes().unwrap()).unwrap();
        assert!(loaded.is_averaged());
        assert_eq!(loaded.children()[0].factors(), t.children()[0].factors());
        loaded.restore_training().unwrap();
        assert_eq!(loaded.children()[0].factors(), &training);
    }

    #[test]
    fn test_bad_magic() {
        let err = ParameterNode::from_bytes(b"NOPE\x01\x00\x00\x00").unwrap_err();
        assert!(matches!(err, TensorError::Persist(_)));
    }
}
