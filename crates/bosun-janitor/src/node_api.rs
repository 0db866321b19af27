//! Seam between the janitor and the data-serving nodes.

use std::collections::BTreeMap;

use bosun_types::{BucketConfig, NodeId, ReplicaState, VbId};

/// Errors returned by per-node control operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NodeApiError {
    /// The node did not answer.
    #[error("node {0} is unreachable")]
    Unreachable(NodeId),

    /// The node does not know the bucket.
    #[error("bucket {0:?} is unknown to the node")]
    UnknownBucket(String),

    /// The node rejected the operation.
    #[error("node rejected the request: {0}")]
    Rejected(String),
}

/// Control operations the janitor issues against individual nodes.
///
/// Implementations talk to the data service of one node at a time; fan-out
/// and timeouts are the caller's concern. Tests substitute
/// [`MemoryNodes`](crate::MemoryNodes).
#[async_trait::async_trait]
pub trait NodeApi: Send + Sync {
    /// Ask a node which vbuckets of `bucket` it holds and in what state.
    ///
    /// Vbuckets the node holds no copy of are simply absent from the
    /// result.
    async fn query_vbucket_states(
        &self,
        bucket: &str,
        node: NodeId,
    ) -> Result<BTreeMap<VbId, ReplicaState>, NodeApiError>;

    /// Install a bucket config (including its map) on a node.
    async fn apply_bucket_config(
        &self,
        bucket: &str,
        node: NodeId,
        config: &BucketConfig,
    ) -> Result<(), NodeApiError>;

    /// Tell a node the bucket is reconciled and may serve traffic.
    async fn mark_bucket_warmed(&self, bucket: &str, node: NodeId) -> Result<(), NodeApiError>;
}
