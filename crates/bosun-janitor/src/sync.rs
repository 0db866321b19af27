//! Config synchronization around a pass.
//!
//! The replicated config must be pulled before deciding anything whenever
//! this node's declared map does not exactly match what the cluster
//! reports (the local view may be stale), and pushed after a fix-up so
//! peers converge on the corrected map. [`map_matches_states`] is that
//! exact-match predicate; [`SyncCoordinator`] wraps the pull/push calls
//! with the pass timeout.

use std::sync::Arc;
use std::time::Duration;

use bosun_config::Replicator;
use bosun_types::{ReplicaState, VbId, VbucketMap};
use tracing::debug;

use crate::observer::ObservedStates;

/// A config pull or push did not complete.
///
/// Cloneable: one sync failure aborts every remaining bucket of a batch,
/// and each gets its own copy of the cause.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    /// Pulling peer revisions failed.
    #[error("config pull failed: {0}")]
    Pull(String),

    /// Pushing local revisions failed.
    #[error("config push failed: {0}")]
    Push(String),

    /// The exchange did not finish within the pass timeout.
    #[error("config sync timed out after {0:?}")]
    Timeout(Duration),
}

/// Whether the declared map exactly matches the observed states.
///
/// Exact means 1:1: every assigned slot observes the state its position
/// calls for (active for the master slot, replica for the rest) and no
/// node outside the chain reports a copy of the vbucket. Vbuckets in
/// `exclude` are not compared.
pub fn map_matches_states(map: &VbucketMap, observed: &ObservedStates, exclude: &[VbId]) -> bool {
    map.iter()
        .filter(|(vb, _)| !exclude.contains(vb))
        .all(|(vb, chain)| {
            let slots_match = chain.slots().iter().enumerate().all(|(i, slot)| match slot {
                None => true,
                Some(node) => {
                    let expected = if i == 0 {
                        ReplicaState::Active
                    } else {
                        ReplicaState::Replica
                    };
                    observed.state_of(vb, node) == expected
                }
            });
            slots_match && observed.reporters(vb).all(|node| chain.contains(&node))
        })
}

/// Runs config pulls and pushes for a pass, bounded by one timeout.
pub struct SyncCoordinator {
    replicator: Arc<dyn Replicator>,
    timeout: Duration,
}

impl SyncCoordinator {
    pub fn new(replicator: Arc<dyn Replicator>, timeout: Duration) -> Self {
        Self {
            replicator,
            timeout,
        }
    }

    /// Pull peer config revisions, unconditionally.
    pub async fn pull(&self) -> Result<(), SyncError> {
        match tokio::time::timeout(self.timeout, self.replicator.pull()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => Err(SyncError::Pull(error.to_string())),
            Err(_) => Err(SyncError::Timeout(self.timeout)),
        }
    }

    /// Pull iff the declared map does not match the observed states.
    ///
    /// Returns whether a pull happened; after a pull the caller must
    /// re-read the config before deciding anything.
    pub async fn pull_if_needed(
        &self,
        map: &VbucketMap,
        observed: &ObservedStates,
        exclude: &[VbId],
    ) -> Result<bool, SyncError> {
        if map_matches_states(map, observed, exclude) {
            return Ok(false);
        }
        debug!("declared map does not match observed states, pulling config");
        self.pull().await?;
        Ok(true)
    }

    /// Push this bucket's revision iff the fixed-up map still does not
    /// match the observed states (peers must converge on the correction).
    ///
    /// Returns whether a push happened.
    pub async fn push_if_needed(
        &self,
        bucket: &str,
        map: &VbucketMap,
        observed: &ObservedStates,
        exclude: &[VbId],
    ) -> Result<bool, SyncError> {
        if map_matches_states(map, observed, exclude) {
            return Ok(false);
        }
        debug!(bucket, "pushing corrected config to peers");
        let buckets = [bucket.to_string()];
        match tokio::time::timeout(self.timeout, self.replicator.push(&buckets)).await {
            Ok(Ok(())) => Ok(true),
            Ok(Err(error)) => Err(SyncError::Push(error.to_string())),
            Err(_) => Err(SyncError::Timeout(self.timeout)),
        }
    }
}
