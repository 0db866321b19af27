//! The per-vbucket chain decision procedure.
//!
//! Given a vbucket's declared chain, the fast-forward chain of an in-flight
//! rebalance (if any), and the states every node reported, [`sanify_chain`]
//! computes the chain that should be considered authoritative right now.
//! [`sanify_map`] runs it across a whole map.
//!
//! The procedure is deterministic and idempotent: re-running it on its own
//! output with the same observations returns that output unchanged, so
//! repeated passes converge instead of oscillating.

use bosun_types::{Chain, NodeId, ReplicaState, VbId, VbucketMap};
use tracing::{debug, error, info, warn};

use crate::observer::ObservedStates;

/// Outcome of sanifying one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sanified {
    /// The chain to treat as authoritative (possibly the input, unchanged).
    Chain(Chain),
    /// The vbucket is in a conflicted state the janitor must not rewrite;
    /// the declared chain stays as it is and the pass reports the vbucket.
    Ignore,
}

/// Decide the authoritative chain for one vbucket.
///
/// Case analysis, in order:
///
/// 1. No declared master (the active slot is unassigned): hard-failover
///    placeholder, keep the chain unchanged.
/// 2. No node reports an active copy: trust the declared chain; the nodes
///    will be re-activated per the map.
/// 3. Exactly one node reports active and it is the declared master: the
///    chain is already right.
/// 4. Exactly one node reports active and it is the fast-forward master:
///    the takeover finished even if the rebalance died, so adopt the
///    fast-forward chain, provided its replica slots have settled (each is
///    unassigned, reports replica, or is the old master reporting dead).
///    Unsettled means fall through to the corrective chain.
/// 5. Exactly one node reports active and it is anyone else: build a
///    corrective chain around that node (see [`corrective_chain`]).
/// 6. Several nodes report active: with the declared master among them,
///    trust the declared chain; without it, refuse to pick a winner and
///    return [`Sanified::Ignore`].
pub fn sanify_chain(
    vb: VbId,
    current: &Chain,
    future: Option<&Chain>,
    observed: &ObservedStates,
) -> Sanified {
    let Some(master) = current.master() else {
        return Sanified::Chain(current.clone());
    };

    let actives = observed.actives(vb);
    match actives.as_slice() {
        [] => {
            debug!(vb, "no active copies observed, re-activating per the declared chain");
            Sanified::Chain(current.clone())
        }
        [active] => sanify_single_active(vb, *active, master, current, future, observed),
        _ => {
            if actives.contains(&master) {
                warn!(
                    vb,
                    actives = actives.len(),
                    "several active copies observed, keeping the declared master"
                );
                Sanified::Chain(current.clone())
            } else {
                error!(
                    vb,
                    ?actives,
                    "several active copies and none is the declared master, leaving chain untouched"
                );
                Sanified::Ignore
            }
        }
    }
}

fn sanify_single_active(
    vb: VbId,
    active: NodeId,
    master: NodeId,
    current: &Chain,
    future: Option<&Chain>,
    observed: &ObservedStates,
) -> Sanified {
    if active == master {
        return Sanified::Chain(current.clone());
    }

    if let Some(future) = future {
        if future.master() == Some(active) && future_chain_settled(vb, master, future, observed) {
            info!(vb, %active, "takeover finished, adopting the fast-forward chain");
            return Sanified::Chain(future.clone());
        }
    }

    Sanified::Chain(corrective_chain(vb, active, current))
}

/// Whether a fast-forward chain can be adopted wholesale.
///
/// Every replica slot must be unassigned, report a replica copy, or be the
/// outgoing master reporting a dead copy (the takeover demoted it but the
/// rebalance never got to clean it up).
fn future_chain_settled(
    vb: VbId,
    current_master: NodeId,
    future: &Chain,
    observed: &ObservedStates,
) -> bool {
    future.slots()[1..].iter().all(|slot| match slot {
        None => true,
        Some(node) => match observed.state_of(vb, node) {
            ReplicaState::Replica => true,
            ReplicaState::Dead => *node == current_master,
            _ => false,
        },
    })
}

/// Rebuild a chain around the one node that actually holds the active copy.
///
/// When that node sits in a replica slot it is promoted and keeps the tail
/// behind it; when it is outside the chain entirely the replicas are gone
/// and it stands alone. Either way the chain keeps its length, padded with
/// unassigned slots, so the configured durability is never silently
/// reduced.
fn corrective_chain(vb: VbId, active: NodeId, current: &Chain) -> Chain {
    match current.position(&active) {
        Some(k) => {
            warn!(vb, %active, slot = k, "promoting replica to active");
            let mut slots = vec![Some(active)];
            slots.extend_from_slice(&current.slots()[k + 1..]);
            slots.resize(current.len(), None);
            Chain::new(slots)
        }
        None => {
            error!(vb, %active, "active copy is outside the declared chain, replicas are lost");
            Chain::solo(active, current.len())
        }
    }
}

/// Sanify every chain of a map.
///
/// Returns the fixed-up map plus the vbuckets the sanifier refused to
/// touch. Vbuckets in `exclude` keep their declared chain without being
/// examined.
pub fn sanify_map(
    map: &VbucketMap,
    fast_forward: Option<&VbucketMap>,
    observed: &ObservedStates,
    exclude: &[VbId],
) -> (VbucketMap, Vec<VbId>) {
    let mut chains = Vec::with_capacity(map.num_vbuckets());
    let mut ignored = Vec::new();
    for (vb, chain) in map.iter() {
        if exclude.contains(&vb) {
            chains.push(chain.clone());
            continue;
        }
        let future = fast_forward.and_then(|ff| ff.chain(vb));
        match sanify_chain(vb, chain, future, observed) {
            Sanified::Chain(fixed) => chains.push(fixed),
            Sanified::Ignore => {
                ignored.push(vb);
                chains.push(chain.clone());
            }
        }
    }
    (VbucketMap::from_chains(chains), ignored)
}
