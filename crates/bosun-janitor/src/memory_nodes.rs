//! In-process node backend.
//!
//! [`MemoryNodes`] simulates the data service of every node in one process:
//! per-node vbucket states, reachability, and warmed-bucket bookkeeping.
//! It backs single-node deployments and every janitor test; fault injection
//! (down and hung nodes) drives the zombie and timeout paths.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use bosun_types::{BucketConfig, NodeId, ReplicaState, VbId};
use tokio::sync::RwLock;

use crate::node_api::{NodeApi, NodeApiError};

#[derive(Default)]
struct NodeSim {
    /// Queries against a down node fail immediately.
    down: bool,
    /// Queries against a hung node never return; pair with a timeout.
    hung: bool,
    /// A node that rejects writes answers queries but refuses config
    /// installs and warmed marks.
    reject_writes: bool,
    /// Bucket name → this node's vbucket states.
    buckets: HashMap<String, BTreeMap<VbId, ReplicaState>>,
    /// Buckets this node has been told are warmed.
    warmed: HashSet<String>,
}

/// A cluster's worth of simulated nodes behind the [`NodeApi`] seam.
pub struct MemoryNodes {
    nodes: RwLock<HashMap<NodeId, NodeSim>>,
}

impl MemoryNodes {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            nodes: RwLock::new(HashMap::new()),
        })
    }

    /// Register a node with no state.
    pub async fn add_node(&self, node: NodeId) {
        self.nodes.write().await.entry(node).or_default();
    }

    /// Make a node refuse every request.
    pub async fn set_down(&self, node: NodeId, down: bool) {
        self.nodes.write().await.entry(node).or_default().down = down;
    }

    /// Make a node accept requests but never answer them.
    pub async fn set_hung(&self, node: NodeId, hung: bool) {
        self.nodes.write().await.entry(node).or_default().hung = hung;
    }

    /// Make a node answer queries but reject config and warmed writes.
    pub async fn set_reject_writes(&self, node: NodeId, reject: bool) {
        self.nodes
            .write()
            .await
            .entry(node)
            .or_default()
            .reject_writes = reject;
    }

    /// Set one vbucket state on one node.
    pub async fn set_state(&self, node: NodeId, bucket: &str, vb: VbId, state: ReplicaState) {
        self.nodes
            .write()
            .await
            .entry(node)
            .or_default()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(vb, state);
    }

    /// Drop one vbucket copy from one node.
    pub async fn remove_state(&self, node: NodeId, bucket: &str, vb: VbId) {
        if let Some(sim) = self.nodes.write().await.get_mut(&node) {
            if let Some(states) = sim.buckets.get_mut(bucket) {
                states.remove(&vb);
            }
        }
    }

    /// Wipe a bucket from a node, as a restart of an ephemeral node would.
    pub async fn clear_bucket(&self, node: NodeId, bucket: &str) {
        if let Some(sim) = self.nodes.write().await.get_mut(&node) {
            sim.buckets.remove(bucket);
            sim.warmed.remove(bucket);
        }
    }

    /// Snapshot of one node's states for a bucket.
    pub async fn states_of(&self, node: NodeId, bucket: &str) -> BTreeMap<VbId, ReplicaState> {
        self.nodes
            .read()
            .await
            .get(&node)
            .and_then(|sim| sim.buckets.get(bucket))
            .cloned()
            .unwrap_or_default()
    }

    /// Nodes that have been marked warmed for a bucket, sorted.
    pub async fn warmed_nodes(&self, bucket: &str) -> Vec<NodeId> {
        let mut warmed: Vec<NodeId> = self
            .nodes
            .read()
            .await
            .iter()
            .filter(|(_, sim)| sim.warmed.contains(bucket))
            .map(|(node, _)| *node)
            .collect();
        warmed.sort_unstable();
        warmed
    }
}

#[async_trait::async_trait]
impl NodeApi for MemoryNodes {
    async fn query_vbucket_states(
        &self,
        bucket: &str,
        node: NodeId,
    ) -> Result<BTreeMap<VbId, ReplicaState>, NodeApiError> {
        {
            let nodes = self.nodes.read().await;
            let sim = nodes.get(&node).ok_or(NodeApiError::Unreachable(node))?;
            if sim.down {
                return Err(NodeApiError::Unreachable(node));
            }
            if !sim.hung {
                // A node that holds no copies answers with an empty map.
                return Ok(sim.buckets.get(bucket).cloned().unwrap_or_default());
            }
        }
        std::future::pending().await
    }

    async fn apply_bucket_config(
        &self,
        bucket: &str,
        node: NodeId,
        config: &BucketConfig,
    ) -> Result<(), NodeApiError> {
        let hung = {
            let mut nodes = self.nodes.write().await;
            let sim = nodes.get_mut(&node).ok_or(NodeApiError::Unreachable(node))?;
            if sim.down {
                return Err(NodeApiError::Unreachable(node));
            }
            if sim.reject_writes {
                return Err(NodeApiError::Rejected("writes rejected".to_string()));
            }
            if !sim.hung {
                // The node adopts exactly the states the map assigns it.
                let mut states = BTreeMap::new();
                if let Some(map) = &config.map {
                    for (vb, chain) in map.iter() {
                        match chain.position(&node) {
                            Some(0) => {
                                states.insert(vb, ReplicaState::Active);
                            }
                            Some(_) => {
                                states.insert(vb, ReplicaState::Replica);
                            }
                            None => {}
                        }
                    }
                }
                sim.buckets.insert(bucket.to_string(), states);
            }
            sim.hung
        };
        if hung {
            std::future::pending().await
        } else {
            Ok(())
        }
    }

    async fn mark_bucket_warmed(&self, bucket: &str, node: NodeId) -> Result<(), NodeApiError> {
        let hung = {
            let mut nodes = self.nodes.write().await;
            let sim = nodes.get_mut(&node).ok_or(NodeApiError::Unreachable(node))?;
            if sim.down {
                return Err(NodeApiError::Unreachable(node));
            }
            if sim.reject_writes {
                return Err(NodeApiError::Rejected("writes rejected".to_string()));
            }
            if !sim.hung {
                sim.warmed.insert(bucket.to_string());
            }
            sim.hung
        };
        if hung {
            std::future::pending().await
        } else {
            Ok(())
        }
    }
}
