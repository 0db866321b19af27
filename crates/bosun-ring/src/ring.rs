//! Weighted consistent-hash ring over the full 32-bit hash space.

use std::collections::BTreeMap;

use bosun_types::NodeId;

use crate::error::RingError;

type Result<T> = std::result::Result<T, RingError>;

/// Virtual nodes placed on the ring per unit of node weight.
pub const DEFAULT_VNODES: u16 = 500;

/// A partition whose owner changed between two assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionMove {
    /// Ring point of the partition.
    pub partition: u32,
    /// Owner under the old assignment.
    pub from: NodeId,
    /// Owner under the new assignment.
    pub to: NodeId,
}

/// An immutable hash ring. Each node contributes a run of virtual node
/// positions proportional to its weight; a partition is owned by the first
/// position at or clockwise-after its point.
///
/// Rings are built once per placement decision, never mutated. Changing
/// membership means building a new ring and diffing the assignments.
#[derive(Debug, Clone)]
pub struct Ring {
    /// Virtual node positions sorted by (hash, node). Ties on hash are
    /// broken by node id so the ordering is total and deterministic.
    positions: Vec<(u32, NodeId)>,
    nodes: Vec<NodeId>,
}

impl Ring {
    /// Build a ring with every node at weight 1 and [`DEFAULT_VNODES`]
    /// virtual nodes each.
    pub fn build(nodes: &[NodeId]) -> Result<Self> {
        let weighted: Vec<(NodeId, u32)> = nodes.iter().map(|n| (*n, 1)).collect();
        Self::build_weighted(&weighted, DEFAULT_VNODES)
    }

    /// Build a ring where each node contributes `base_vnodes * weight`
    /// virtual nodes. Zero-weight nodes contribute no positions.
    pub fn build_weighted(nodes: &[(NodeId, u32)], base_vnodes: u16) -> Result<Self> {
        let mut positions = Vec::new();
        for (node, weight) in nodes {
            let count = u64::from(base_vnodes) * u64::from(*weight);
            let mut hash = base_hash(node);
            for _ in 0..count {
                positions.push((hash, *node));
                hash = next_hash(hash);
            }
        }
        if positions.is_empty() {
            return Err(RingError::EmptyRing);
        }
        positions.sort_unstable();
        positions.dedup();

        let mut ring_nodes: Vec<NodeId> = nodes
            .iter()
            .filter(|(_, weight)| *weight > 0)
            .map(|(node, _)| *node)
            .collect();
        ring_nodes.sort_unstable();
        ring_nodes.dedup();

        Ok(Self {
            positions,
            nodes: ring_nodes,
        })
    }

    /// Nodes with at least one position on the ring, sorted.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// The node owning `point`: the first position at or clockwise-after it.
    pub fn owner_of(&self, point: u32) -> NodeId {
        let idx = self.positions.partition_point(|(hash, _)| *hash < point);
        let idx = if idx == self.positions.len() { 0 } else { idx };
        self.positions[idx].1
    }

    /// Up to `count` distinct nodes starting at `point` and walking
    /// clockwise. Returns fewer when the ring has fewer distinct nodes.
    pub fn owners(&self, point: u32, count: usize) -> Vec<NodeId> {
        let start = self.positions.partition_point(|(hash, _)| *hash < point);
        let (before, after) = self.positions.split_at(start);
        let mut owners = Vec::with_capacity(count);
        for (_, node) in after.iter().chain(before.iter()) {
            if !owners.contains(node) {
                owners.push(*node);
                if owners.len() == count {
                    break;
                }
            }
        }
        owners
    }

    /// Assign an owner to each partition point.
    pub fn assign(&self, points: &[u32]) -> Vec<(u32, NodeId)> {
        points
            .iter()
            .map(|point| (*point, self.owner_of(*point)))
            .collect()
    }

    /// Partitions whose owner differs between two assignments.
    ///
    /// Both assignments must cover the same partitions in the same order;
    /// anything else is a [`RingError::SizeMismatch`].
    pub fn diff(old: &[(u32, NodeId)], new: &[(u32, NodeId)]) -> Result<Vec<PartitionMove>> {
        if old.len() != new.len()
            || old
                .iter()
                .zip(new.iter())
                .any(|((a, _), (b, _))| a != b)
        {
            return Err(RingError::SizeMismatch {
                left: old.len(),
                right: new.len(),
            });
        }
        Ok(old
            .iter()
            .zip(new.iter())
            .filter(|((_, from), (_, to))| from != to)
            .map(|((partition, from), (_, to))| PartitionMove {
                partition: *partition,
                from: *from,
                to: *to,
            })
            .collect())
    }
}

/// Evenly spaced partition points for `2^exponent` partitions: point `i`
/// sits at `i << (32 - exponent)`.
pub fn partition_points(exponent: u8) -> Vec<u32> {
    let count: u64 = 1 << exponent;
    let spacing: u64 = 1 << (32 - u32::from(exponent));
    (0..count).map(|i| (i * spacing) as u32).collect()
}

/// Partitions owned per node. Every node in `nodes` gets an entry, zero
/// included; owners outside `nodes` are counted too.
pub fn load_counts(nodes: &[NodeId], assignment: &[(u32, NodeId)]) -> BTreeMap<NodeId, usize> {
    let mut counts: BTreeMap<NodeId, usize> = nodes.iter().map(|n| (*n, 0)).collect();
    for (_, owner) in assignment {
        *counts.entry(*owner).or_insert(0) += 1;
    }
    counts
}

/// First virtual node position for a node, from the BLAKE3 hash of its id.
fn base_hash(node: &NodeId) -> u32 {
    let digest = blake3::hash(node.as_bytes());
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&digest.as_bytes()[..4]);
    u32::from_le_bytes(bytes)
}

/// Roll one virtual node position into the next (xorshift32). Zero is a
/// fixed point of xorshift, so it is nudged onto an odd constant first.
fn next_hash(hash: u32) -> u32 {
    let mut x = if hash == 0 { 0x9E37_79B9 } else { hash };
    x ^= x << 13;
    x ^= x >> 17;
    x ^= x << 5;
    x
}
