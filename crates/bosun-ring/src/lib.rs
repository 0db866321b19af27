//! Consistent-hash ring and vbucket map planning.
//!
//! The ring places vbucket partitions on nodes with weighted virtual nodes;
//! the planner turns ring assignments into initial [`VbucketMap`]s and
//! judges whether an existing map is still balanced.
//!
//! [`VbucketMap`]: bosun_types::VbucketMap

mod error;
mod planner;
mod ring;

pub use error::RingError;
pub use planner::{exponent_for, initial_map, is_balanced};
pub use ring::{DEFAULT_VNODES, PartitionMove, Ring, load_counts, partition_points};
