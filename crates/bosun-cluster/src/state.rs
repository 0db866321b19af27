//! Cluster state: the live membership view.
//!
//! [`ClusterState`] is the shared, read-mostly data structure that other
//! components (the janitor, config replication) use to find out who is in
//! the cluster and whether they may host active data.

use std::collections::HashMap;
use std::sync::Arc;

use bosun_types::{ClusterEvent, Member, MemberState, NodeId};
use tokio::sync::{RwLock, broadcast};
use tracing::info;

/// Shared cluster state maintained by the membership service.
///
/// Holds the current set of members and a broadcast channel through which
/// other components can subscribe to membership events.
pub struct ClusterState {
    /// Current cluster members, keyed by node ID.
    members: RwLock<HashMap<NodeId, Member>>,
    /// This node's identifier.
    local_node_id: NodeId,
    /// Broadcast channel for cluster events.
    event_tx: broadcast::Sender<ClusterEvent>,
}

impl ClusterState {
    /// Create a new cluster state for the given local node.
    pub fn new(local_node_id: NodeId) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(256);
        Arc::new(Self {
            members: RwLock::new(HashMap::new()),
            local_node_id,
            event_tx,
        })
    }

    /// Subscribe to membership events.
    pub fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.event_tx.subscribe()
    }

    /// Return this node's ID.
    pub fn local_node_id(&self) -> NodeId {
        self.local_node_id
    }

    /// Add or update a member in the cluster.
    ///
    /// Broadcasts a [`ClusterEvent::NodeJoined`] event.
    pub async fn add_member(&self, member: Member) {
        let node_id = member.node_id;
        {
            let mut members = self.members.write().await;
            members.insert(node_id, member.clone());
        }

        info!(%node_id, name = %member.name, "member joined cluster");
        let _ = self.event_tx.send(ClusterEvent::NodeJoined(member));
    }

    /// Remove a member from the cluster (graceful departure).
    ///
    /// Broadcasts a [`ClusterEvent::NodeLeft`] event.
    pub async fn remove_member(&self, node_id: &NodeId) {
        {
            let mut members = self.members.write().await;
            members.remove(node_id);
        }

        info!(%node_id, "member left cluster");
        let _ = self.event_tx.send(ClusterEvent::NodeLeft(*node_id));
    }

    /// Change a member's administrative state (e.g. fail it over).
    ///
    /// Broadcasts a [`ClusterEvent::MemberStateChanged`] event. No-op for
    /// unknown nodes.
    pub async fn set_member_state(&self, node_id: &NodeId, state: MemberState) {
        {
            let mut members = self.members.write().await;
            match members.get_mut(node_id) {
                Some(member) => member.state = state,
                None => return,
            }
        }

        info!(%node_id, ?state, "member state changed");
        let _ = self
            .event_tx
            .send(ClusterEvent::MemberStateChanged(*node_id, state));
    }

    /// Return a snapshot of all current members.
    pub async fn members(&self) -> Vec<Member> {
        self.members.read().await.values().cloned().collect()
    }

    /// Return a specific member by node ID.
    pub async fn get_member(&self, node_id: &NodeId) -> Option<Member> {
        self.members.read().await.get(node_id).cloned()
    }

    /// IDs of members in the [`MemberState::Active`] state, sorted.
    ///
    /// These are the nodes allowed to host buckets.
    pub async fn active_members(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .members
            .read()
            .await
            .values()
            .filter(|m| m.state == MemberState::Active)
            .map(|m| m.node_id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Return the number of members in the cluster.
    pub async fn member_count(&self) -> usize {
        self.members.read().await.len()
    }
}

impl std::fmt::Debug for ClusterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterState")
            .field("local_node_id", &self.local_node_id)
            .finish_non_exhaustive()
    }
}
