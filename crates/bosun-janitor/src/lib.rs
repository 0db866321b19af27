//! Reconciliation ("janitor") engine for Bosun.
//!
//! The janitor continuously reconciles each bucket's declared vbucket map
//! against the runtime states its nodes actually report, healing the damage
//! left by crashes, restarts, and interrupted rebalances.
//!
//! This crate provides:
//!
//! - [`ObservedStates`] and the state collector: parallel per-node queries
//!   that partition the cluster into responders and zombies.
//! - [`sanify_chain`] / [`sanify_map`]: the per-vbucket decision procedure
//!   that picks the authoritative replica chain.
//! - [`find_unsafe_nodes`]: flags declared active owners whose copy is gone
//!   while replicas still hold data.
//! - [`SyncCoordinator`]: decides when the replicated config must be pulled
//!   or pushed around a pass.
//! - [`Janitor`]: drives the full pass state machine per bucket, under
//!   cluster-wide leases.
//! - [`MemoryNodes`]: an in-process node backend for single-node
//!   deployments and tests.

pub mod error;
pub mod memory_nodes;
pub mod node_api;
pub mod observer;
pub mod orchestrator;
pub mod sanify;
pub mod sync;
pub mod unsafe_nodes;

pub use error::{ErrorKind, JanitorError};
pub use memory_nodes::MemoryNodes;
pub use node_api::{NodeApi, NodeApiError};
pub use observer::ObservedStates;
pub use orchestrator::{CleanupOptions, Janitor, ServerListCheck, check_server_list};
pub use sanify::{Sanified, sanify_chain, sanify_map};
pub use sync::{SyncCoordinator, SyncError, map_matches_states};
pub use unsafe_nodes::find_unsafe_nodes;
