//! Network namespace discovery and thread context management.
//!
//! Provides the process-table view of every namespace on the host and the
//! `setns(2)` plumbing used to visit them one by one from the calling
//! thread.

pub mod context;
pub mod enumerate;
#[cfg(target_os = "linux")]
pub mod nsid;
pub mod procfs;

pub use context::{ContextToken, EnteredNamespace, NetnsContext, SetnsContext};
pub use enumerate::{Enumeration, SkippedProcess, enumerate};
pub use procfs::{ProcFs, ProcessInspector};
