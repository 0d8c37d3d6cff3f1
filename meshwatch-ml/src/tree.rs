//! Isolation tree implementation
//!
//! Trees are built by recursively partitioning a subsample on a random
//! feature at a random split value until every point is isolated or the depth
//! limit is reached. The result is an index-based arena rooted at node 0.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{MlError, MlResult, Node, NodeType, Sample};

/// Split attempts before a node gives up and becomes a leaf
const MAX_SPLIT_ATTEMPTS: usize = 10;

/// Isolation tree structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    /// Build a tree over `samples`
    pub fn build<R: Rng + ?Sized>(samples: &[Sample], max_depth: u8, rng: &mut R) -> MlResult<Self> {
        if samples.is_empty() {
            return Err(MlError::InsufficientData { needed: 1, got: 0 });
        }
        let width = samples[0].len();
        if width == 0 {
            return Err(MlError::InvalidFeature("samples have no features".into()));
        }
        if samples.iter().any(|s| s.len() != width) {
            return Err(MlError::InvalidFeature("samples have differing feature counts".into()));
        }

        let mut tree = Self { nodes: Vec::new() };
        let refs: Vec<&Sample> = samples.iter().collect();
        tree.build_node(&refs, 0, max_depth, rng);
        Ok(tree)
    }

    /// Adopt an externally supplied node arena
    ///
    /// Every child index must point forward in the arena and one level
    /// deeper than its parent, which rules out cycles and shared subtrees.
    pub fn from_nodes(nodes: Vec<Node>) -> MlResult<Self> {
        if nodes.is_empty() {
            return Err(MlError::InvalidModel("tree has no nodes".into()));
        }
        if nodes[0].depth != 0 {
            return Err(MlError::InvalidModel("root depth must be 0".into()));
        }
        let mut referenced = vec![false; nodes.len()];
        for (index, node) in nodes.iter().enumerate() {
            if let NodeType::Internal { left, right, .. } = node.node_type {
                for child in [left as usize, right as usize] {
                    if child <= index || child >= nodes.len() {
                        return Err(MlError::InvalidModel(format!(
                            "node {} has out-of-order child {}",
                            index, child
                        )));
                    }
                    if referenced[child] {
                        return Err(MlError::InvalidModel(format!("node {} has two parents", child)));
                    }
                    if nodes[child].depth != node.depth.saturating_add(1) {
                        return Err(MlError::InvalidModel(format!("node {} has inconsistent depth", child)));
                    }
                    referenced[child] = true;
                }
            }
        }
        Ok(Self { nodes })
    }

    fn build_node<R: Rng + ?Sized>(&mut self, samples: &[&Sample], depth: u8, max_depth: u8, rng: &mut R) -> u32 {
        let index = self.nodes.len() as u32;
        // Placeholder until children are known
        self.nodes.push(Node::external(samples.len() as u32, depth));

        if depth >= max_depth || samples.len() <= 1 {
            return index;
        }
        let Some((feature, split_value)) = select_split(samples, rng) else {
            return index;
        };

        let (left, right): (Vec<&Sample>, Vec<&Sample>) = samples
            .iter()
            .copied()
            .partition(|s| s.get_feature(feature as usize).unwrap_or(f64::INFINITY) < split_value);
        if left.is_empty() || right.is_empty() {
            return index;
        }

        let left_index = self.build_node(&left, depth + 1, max_depth, rng);
        let right_index = self.build_node(&right, depth + 1, max_depth, rng);
        self.nodes[index as usize] = Node::internal(feature, split_value, left_index, right_index, depth);
        index
    }

    /// Depth at which `sample` is isolated, plus the leaf's `c(size)` adjustment
    pub fn path_length(&self, sample: &Sample) -> MlResult<f64> {
        let mut index = 0usize;
        loop {
            let node = self
                .nodes
                .get(index)
                .ok_or_else(|| MlError::InvalidModel(format!("dangling node index {}", index)))?;
            if node.is_leaf() {
                return Ok(node.path_length());
            }
            index = node.traverse(sample)? as usize;
        }
    }

    /// The node arena
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Get the number of nodes in the tree
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get tree depth
    pub fn depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth as usize).max().unwrap_or(0)
    }

    /// Largest feature index any split reads
    pub fn max_feature(&self) -> Option<u8> {
        self.nodes
            .iter()
            .filter_map(|n| match n.node_type {
                NodeType::Internal { feature, .. } => Some(feature),
                NodeType::External { .. } => None,
            })
            .max()
    }
}

/// Random feature with a non-degenerate range and a split drawn uniformly inside it
fn select_split<R: Rng + ?Sized>(samples: &[&Sample], rng: &mut R) -> Option<(u8, f64)> {
    let width = samples[0].len();
    for _ in 0..MAX_SPLIT_ATTEMPTS {
        let feature = rng.gen_range(0..width);
        let (min, max) = feature_range(samples, feature);
        if max - min > f64::EPSILON {
            return Some((feature as u8, rng.gen_range(min..max)));
        }
    }
    None
}

fn feature_range(samples: &[&Sample], feature: usize) -> (f64, f64) {
    samples
        .iter()
        .filter_map(|s| s.get_feature(feature))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
}
