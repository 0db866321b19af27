//! Replicated configuration layer backed by Fjall.
//!
//! [`ConfigStore`] is each node's local copy of the cluster configuration:
//! bucket definitions keyed by name, plus the last map known to be balanced
//! per bucket. Every stored value is a [`Versioned`] wrapper whose causal
//! clock gates updates, so a stale writer gets a [`ConfigError::Conflict`]
//! instead of silently clobbering a newer revision.
//!
//! Cross-node convergence is the job of a [`Replicator`], which pulls remote
//! revisions in and pushes local ones out.
//!
//! [`Versioned`]: bosun_types::Versioned

mod error;
mod replicator;
mod store;

pub use error::ConfigError;
pub use replicator::{NoopReplicator, ReplicationError, Replicator};
pub use store::ConfigStore;
