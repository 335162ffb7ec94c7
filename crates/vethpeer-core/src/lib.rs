//! # vethpeer-core
//!
//! Finds the network namespace holding the other end of a veth pair.
//!
//! This crate provides:
//! - **Namespace enumeration**: every network namespace reachable from the
//!   process table, keyed by nsfs inode.
//! - **Link inspection**: the `link-netnsid` the current namespace records
//!   for an interface's peer.
//! - **Namespace context**: saving, entering and restoring the calling
//!   thread's network namespace, and asking the active namespace which
//!   relative identifier it uses for another one.
//! - **Correlation**: asking the origin namespace for its identifier of
//!   every candidate, which turns a namespace-relative identifier into a
//!   host-wide identity.
//!
//! The Linux collaborators sit behind traits so the correlation can be
//! exercised without privileges.

pub mod correlate;
pub mod link;
pub mod namespace;

pub use correlate::{PeerResolution, Resolver};
