//! Shared types and identifiers for Bosun.
//!
//! This crate defines the core data model used across the Bosun workspace:
//! identifiers ([`NodeId`], [`VbId`]), placement structures ([`Chain`],
//! [`VbucketMap`], [`BucketConfig`]), per-copy runtime state
//! ([`ReplicaState`]), cluster types ([`Member`], [`MemberState`],
//! [`ClusterEvent`]), and causal versioning ([`CausalClock`], [`Versioned`]).

use std::fmt;

use serde::{Deserialize, Serialize};

mod clock;

pub use clock::{CausalClock, ClockOrdering, Versioned};

// ---------------------------------------------------------------------------
// ID types
// ---------------------------------------------------------------------------

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name([u8; 32]);

        impl $name {
            /// Create an ID by hashing arbitrary data with BLAKE3.
            pub fn from_data(data: &[u8]) -> Self {
                Self(blake3::hash(data).into())
            }

            /// Return the raw 32-byte representation.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for byte in &self.0 {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }
    };
}

define_id!(
    /// Identifier for a cluster node, derived from its configured name.
    NodeId
);

impl NodeId {
    /// Derive a node ID from a human-readable node name.
    pub fn from_name(name: &str) -> Self {
        Self::from_data(name.as_bytes())
    }
}

/// Index of a vbucket (shard) within a bucket's keyspace.
pub type VbId = u16;

// ---------------------------------------------------------------------------
// Replica chains and vbucket maps
// ---------------------------------------------------------------------------

/// Runtime state of one vbucket copy on one node, as reported by that node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicaState {
    /// The node serves reads and writes for this vbucket.
    Active,
    /// The node holds a replica copy fed by the active owner.
    Replica,
    /// A copy is being built on the node (backfill in progress).
    Pending,
    /// The node holds a copy that was deliberately taken out of service.
    Dead,
    /// The node was queried and reports no copy of this vbucket.
    Missing,
}

/// Ordered owner assignment for one vbucket: slot 0 is the active owner,
/// the remaining slots are replicas. `None` means no owner is assigned to
/// that slot.
///
/// Chain length is fixed at `1 + num_replicas` for the lifetime of a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Chain(Vec<Option<NodeId>>);

impl Chain {
    /// Build a chain from raw slots.
    pub fn new(slots: Vec<Option<NodeId>>) -> Self {
        Self(slots)
    }

    /// A chain of `len` slots with every slot unassigned.
    pub fn unassigned(len: usize) -> Self {
        Self(vec![None; len])
    }

    /// A chain with only the active slot assigned, replicas unassigned.
    ///
    /// `len` counts the active slot, so it must be at least 1.
    pub fn solo(active: NodeId, len: usize) -> Self {
        debug_assert!(len >= 1, "a chain needs at least the active slot");
        let mut slots = vec![None; len];
        slots[0] = Some(active);
        Self(slots)
    }

    /// The declared active owner, if the active slot is assigned.
    pub fn master(&self) -> Option<NodeId> {
        self.0.first().copied().flatten()
    }

    /// All slots in order, including unassigned ones.
    pub fn slots(&self) -> &[Option<NodeId>] {
        &self.0
    }

    /// The node at slot `index`, if assigned.
    pub fn get(&self, index: usize) -> Option<NodeId> {
        self.0.get(index).copied().flatten()
    }

    /// Number of slots (1 active + replicas).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the chain has no slots at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when `node` occupies any slot.
    pub fn contains(&self, node: &NodeId) -> bool {
        self.0.iter().any(|slot| slot.as_ref() == Some(node))
    }

    /// Slot index of `node`, if it occupies one.
    pub fn position(&self, node: &NodeId) -> Option<usize> {
        self.0.iter().position(|slot| slot.as_ref() == Some(node))
    }

    /// Assigned nodes in slot order, skipping unassigned slots.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.0.iter().filter_map(|slot| *slot)
    }
}

/// The declared placement for a bucket: one [`Chain`] per vbucket index.
///
/// Every chain has the same length; the sanifier never changes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VbucketMap(Vec<Chain>);

impl VbucketMap {
    /// Build a map from one chain per vbucket.
    pub fn from_chains(chains: Vec<Chain>) -> Self {
        debug_assert!(
            chains.windows(2).all(|w| w[0].len() == w[1].len()),
            "chain length must be uniform across the map"
        );
        Self(chains)
    }

    /// Number of vbuckets in the map.
    pub fn num_vbuckets(&self) -> usize {
        self.0.len()
    }

    /// Chain length shared by every vbucket (0 for an empty map).
    pub fn chain_len(&self) -> usize {
        self.0.first().map_or(0, Chain::len)
    }

    /// The chain for one vbucket.
    pub fn chain(&self, vb: VbId) -> Option<&Chain> {
        self.0.get(vb as usize)
    }

    /// All chains in vbucket order.
    pub fn chains(&self) -> &[Chain] {
        &self.0
    }

    /// Replace the chain for one vbucket.
    pub fn set_chain(&mut self, vb: VbId, chain: Chain) {
        debug_assert_eq!(chain.len(), self.chain_len());
        self.0[vb as usize] = chain;
    }

    /// Iterate `(vbucket, chain)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (VbId, &Chain)> {
        self.0.iter().enumerate().map(|(vb, c)| (vb as VbId, c))
    }
}

// ---------------------------------------------------------------------------
// Bucket configuration
// ---------------------------------------------------------------------------

/// Storage engine class of a bucket, as far as placement safety cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageEngine {
    /// Copies survive a node restart.
    Persistent,
    /// Copies live in memory only; a restarted node comes back empty.
    Ephemeral,
}

/// Minimum durability requirement for writes to the bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurabilityLevel {
    /// Acknowledge once the active owner has the write.
    #[default]
    None,
    /// Acknowledge once a majority of the chain has the write in memory.
    Majority,
    /// Majority in memory, plus persisted on the active owner.
    MajorityAndPersistActive,
    /// Persisted on a majority of the chain.
    PersistToMajority,
}

/// Pause/resume lifecycle of a bucket. A hibernating bucket has no live
/// copies to reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HibernationState {
    /// Copies are being flushed out in preparation for pause.
    Pausing,
    /// The bucket is fully paused.
    Paused,
    /// Copies are being rebuilt from the paused image.
    Resuming,
}

/// Declared configuration of a bucket: the persisted source of truth that
/// reconciliation reads, fixes up, and writes back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Bucket name, unique within the cluster.
    pub name: String,
    /// Number of vbuckets the keyspace is split into. Must be a power of two.
    pub num_vbuckets: u16,
    /// Replica copies per vbucket (chain length is `1 + num_replicas`).
    pub num_replicas: u8,
    /// Storage engine class; drives the unsafe-failover check.
    pub storage: StorageEngine,
    /// Minimum durability level enforced for writes.
    pub durability: DurabilityLevel,
    /// Nodes currently hosting the bucket. The authoritative server list.
    pub servers: Vec<NodeId>,
    /// Nodes the bucket is planned to live on, used to seed an empty
    /// server list.
    pub desired_servers: Option<Vec<NodeId>>,
    /// Declared vbucket placement. `None` until the first map is planned.
    pub map: Option<VbucketMap>,
    /// Target placement while a topology change is in flight.
    pub fast_forward_map: Option<VbucketMap>,
    /// Set while the bucket is paused or moving in/out of pause.
    pub hibernation: Option<HibernationState>,
}

impl BucketConfig {
    /// A new bucket with no map yet and everything else defaulted.
    pub fn new(name: impl Into<String>, num_vbuckets: u16, num_replicas: u8) -> Self {
        Self {
            name: name.into(),
            num_vbuckets,
            num_replicas,
            storage: StorageEngine::Persistent,
            durability: DurabilityLevel::default(),
            servers: Vec::new(),
            desired_servers: None,
            map: None,
            fast_forward_map: None,
            hibernation: None,
        }
    }

    /// Chain length for this bucket: one active slot plus the replicas.
    pub fn chain_len(&self) -> usize {
        1 + self.num_replicas as usize
    }
}

// ---------------------------------------------------------------------------
// Cluster types
// ---------------------------------------------------------------------------

/// A member of the cluster as the membership layer sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Unique identifier, derived from the member's name.
    pub node_id: NodeId,
    /// Human-readable node name.
    pub name: String,
    /// Administrative membership state.
    pub state: MemberState,
    /// Incarnation number, incremented on each restart.
    pub generation: u64,
}

/// Administrative membership state of a cluster node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberState {
    /// Fully joined; may host buckets.
    Active,
    /// Added to the cluster but not yet rebalanced in.
    InactiveAdded,
    /// Failed over; still listed but must not host active copies.
    InactiveFailed,
}

/// Events broadcast to components that track membership changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterEvent {
    /// A node joined the cluster.
    NodeJoined(Member),
    /// A node left the cluster for good.
    NodeLeft(NodeId),
    /// A node's administrative state changed (e.g. failed over).
    MemberStateChanged(NodeId, MemberState),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
