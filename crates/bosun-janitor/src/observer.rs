//! Observed-state collection.
//!
//! One pass queries every server of a bucket concurrently and folds the
//! answers into an [`ObservedStates`] snapshot. Servers that fail to answer
//! within the pass timeout are zombies; the caller must abort the pass for
//! this bucket, because deciding chains without full visibility risks data
//! loss.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use bosun_types::{NodeId, ReplicaState, VbId};
use tokio::task::JoinSet;
use tracing::debug;

use crate::node_api::{NodeApi, NodeApiError};

/// Everything the cluster reported about a bucket's vbuckets in one pass.
///
/// Holds one `(node, state)` set per vbucket. Missing copies are
/// represented by absence: [`ObservedStates::state_of`] answers
/// [`ReplicaState::Missing`] for any node without a recorded copy.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ObservedStates {
    by_vbucket: BTreeMap<VbId, BTreeMap<NodeId, ReplicaState>>,
}

impl ObservedStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a node's state for one vbucket. [`ReplicaState::Missing`]
    /// entries are dropped; absence already means that.
    pub fn insert(&mut self, vb: VbId, node: NodeId, state: ReplicaState) {
        if state == ReplicaState::Missing {
            self.by_vbucket.entry(vb).or_default().remove(&node);
            return;
        }
        self.by_vbucket.entry(vb).or_default().insert(node, state);
    }

    /// The state `node` reported for `vb`.
    pub fn state_of(&self, vb: VbId, node: &NodeId) -> ReplicaState {
        self.by_vbucket
            .get(&vb)
            .and_then(|states| states.get(node))
            .copied()
            .unwrap_or(ReplicaState::Missing)
    }

    /// Nodes reporting an active copy of `vb`, sorted.
    pub fn actives(&self, vb: VbId) -> Vec<NodeId> {
        self.by_vbucket
            .get(&vb)
            .map(|states| {
                states
                    .iter()
                    .filter(|(_, state)| **state == ReplicaState::Active)
                    .map(|(node, _)| *node)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Nodes holding any copy of `vb`, sorted.
    pub fn reporters(&self, vb: VbId) -> impl Iterator<Item = NodeId> + '_ {
        self.by_vbucket
            .get(&vb)
            .into_iter()
            .flat_map(|states| states.keys().copied())
    }
}

/// Query every server for its vbucket states, in parallel.
///
/// Returns the merged snapshot plus the zombies: servers that errored or
/// failed to answer within `timeout` (`None` waits indefinitely). Vbuckets
/// in `exclude` are left out of the snapshot.
pub async fn collect(
    nodes: &Arc<dyn NodeApi>,
    bucket: &str,
    servers: &[NodeId],
    exclude: &[VbId],
    timeout: Option<Duration>,
) -> (ObservedStates, Vec<NodeId>) {
    let mut join_set = JoinSet::new();
    for server in servers {
        let api = Arc::clone(nodes);
        let bucket = bucket.to_string();
        let server = *server;
        join_set.spawn(async move {
            let query = api.query_vbucket_states(&bucket, server);
            let result = match timeout {
                Some(limit) => match tokio::time::timeout(limit, query).await {
                    Ok(result) => result,
                    Err(_) => Err(NodeApiError::Unreachable(server)),
                },
                None => query.await,
            };
            (server, result)
        });
    }

    let mut observed = ObservedStates::new();
    let mut responded = BTreeSet::new();
    while let Some(joined) = join_set.join_next().await {
        let Ok((server, result)) = joined else {
            continue;
        };
        match result {
            Ok(states) => {
                responded.insert(server);
                for (vb, state) in states {
                    if exclude.contains(&vb) {
                        continue;
                    }
                    observed.insert(vb, server, state);
                }
            }
            Err(error) => {
                debug!(%server, %error, "state query failed");
            }
        }
    }

    let mut zombies: Vec<NodeId> = servers
        .iter()
        .filter(|server| !responded.contains(*server))
        .copied()
        .collect();
    zombies.sort_unstable();
    zombies.dedup();
    (observed, zombies)
}
