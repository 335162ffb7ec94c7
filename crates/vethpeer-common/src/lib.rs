//! # vethpeer-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the vethpeer workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and provides the primitives the enumerator, the resolver
//! and the correlator exchange.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
