//! Isolation tree node implementation
//!
//! Trees are stored as an arena of nodes addressed by index, so a forest can
//! be rebuilt or replaced wholesale without any pointer bookkeeping. Node 0 is
//! always the root.

use serde::{Deserialize, Serialize};

use crate::{MlError, MlResult, Sample};

/// Euler-Mascheroni constant
pub const EULER_GAMMA: f64 = 0.577_215_664_9;

/// Node type in the isolation tree
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeType {
    /// Internal node with split condition
    Internal {
        /// Feature index to split on
        feature: u8,
        /// Values strictly below go left
        split_value: f64,
        /// Left child index
        left: u32,
        /// Right child index
        right: u32,
    },
    /// Leaf node (external)
    External {
        /// Number of training samples that reached this leaf
        size: u32,
    },
}

/// Arena node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node type and data
    pub node_type: NodeType,
    /// Edges from the root
    pub depth: u8,
}

impl Node {
    /// Create an internal node
    pub fn internal(feature: u8, split_value: f64, left: u32, right: u32, depth: u8) -> Self {
        Self {
            node_type: NodeType::Internal {
                feature,
                split_value,
                left,
                right,
            },
            depth,
        }
    }

    /// Create an external (leaf) node
    pub fn external(size: u32, depth: u8) -> Self {
        Self {
            node_type: NodeType::External { size },
            depth,
        }
    }

    /// Check if node is a leaf
    pub fn is_leaf(&self) -> bool {
        matches!(self.node_type, NodeType::External { .. })
    }

    /// Path length credited to a sample that ends at this node
    ///
    /// Leaves add the expected remaining depth `c(size)` for the samples they
    /// did not separate.
    pub fn path_length(&self) -> f64 {
        match self.node_type {
            NodeType::External { size } => self.depth as f64 + c_factor(size as usize),
            NodeType::Internal { .. } => self.depth as f64,
        }
    }

    /// Child index to visit next
    pub fn traverse(&self, sample: &Sample) -> MlResult<u32> {
        match self.node_type {
            NodeType::Internal {
                feature,
                split_value,
                left,
                right,
            } => {
                let value = sample.get_feature(feature as usize).ok_or_else(|| {
                    MlError::InvalidFeature(format!(
                        "feature {} requested from a {}-feature sample",
                        feature,
                        sample.len()
                    ))
                })?;
                Ok(if value < split_value { left } else { right })
            }
            NodeType::External { .. } => Err(MlError::InvalidModel("cannot traverse from a leaf".into())),
        }
    }
}

/// Average path length of an unsuccessful search in a binary search tree
/// built from `n` points: `c(n) = 2(ln(n-1) + γ) - 2(n-1)/n`, with `c(n) = 0`
/// for `n <= 1`.
pub fn c_factor(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
}
