//! Cluster membership view and leadership leases.
//!
//! This crate provides:
//!
//! - [`ClusterState`], the shared membership view other components consult
//!   to learn who is in the cluster and in what administrative state.
//! - [`LeaseService`], the seam through which maintenance work claims
//!   exclusive ownership of a resource against a quorum of nodes.

mod error;
mod lease;
mod state;

pub use error::LeaseError;
pub use lease::{Lease, LeaseService, LocalLeases, Quorum};
pub use state::ClusterState;
