//! Causal versioning for replicated configuration.
//!
//! Every persisted configuration value carries a [`CausalClock`] recording
//! which node revisions it has absorbed. Clocks order concurrent edits
//! without wall time: two edits that neither dominate each other are
//! [`ClockOrdering::Concurrent`] and need conflict resolution upstream.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::NodeId;

/// Partial order between two causal clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOrdering {
    /// Identical entries.
    Equal,
    /// Every entry of `self` is dominated by `other`.
    Before,
    /// Every entry of `other` is dominated by `self`.
    After,
    /// Each clock has at least one entry the other lacks.
    Concurrent,
}

/// A per-node revision vector. Entries absent from the map count as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CausalClock(BTreeMap<NodeId, u64>);

impl CausalClock {
    /// A clock with no revisions recorded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Revision recorded for `node` (zero if absent).
    pub fn get(&self, node: &NodeId) -> u64 {
        self.0.get(node).copied().unwrap_or(0)
    }

    /// Return a copy with `node`'s revision incremented by one.
    #[must_use]
    pub fn bump(&self, node: NodeId) -> Self {
        let mut entries = self.0.clone();
        *entries.entry(node).or_insert(0) += 1;
        Self(entries)
    }

    /// Return the pairwise maximum of both clocks.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut entries = self.0.clone();
        for (node, revision) in &other.0 {
            let entry = entries.entry(*node).or_insert(0);
            *entry = (*entry).max(*revision);
        }
        Self(entries)
    }

    /// Compare two clocks under the causal partial order.
    pub fn compare(&self, other: &Self) -> ClockOrdering {
        let mut self_ahead = false;
        let mut other_ahead = false;
        for node in self.0.keys().chain(other.0.keys()) {
            let a = self.get(node);
            let b = other.get(node);
            if a > b {
                self_ahead = true;
            } else if b > a {
                other_ahead = true;
            }
        }
        match (self_ahead, other_ahead) {
            (false, false) => ClockOrdering::Equal,
            (false, true) => ClockOrdering::Before,
            (true, false) => ClockOrdering::After,
            (true, true) => ClockOrdering::Concurrent,
        }
    }
}

/// A value paired with the causal clock of its last edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// The current value.
    pub value: T,
    /// Clock as of the edit that produced `value`.
    pub clock: CausalClock,
}

impl<T> Versioned<T> {
    /// Wrap a freshly created value, attributed to `node`.
    pub fn initial(value: T, node: NodeId) -> Self {
        Self {
            value,
            clock: CausalClock::new().bump(node),
        }
    }
}
