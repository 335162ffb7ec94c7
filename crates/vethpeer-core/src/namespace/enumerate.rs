//! Discovery of every network namespace reachable from the process table.

use serde::Serialize;
use vethpeer_common::config::ReadFailurePolicy;
use vethpeer_common::error::Result;
use vethpeer_common::types::{NamespaceKind, NamespaceTable, Pid};

use super::procfs::ProcessInspector;

/// A process left out of the table because its namespace was unreadable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedProcess {
    /// Process that was skipped.
    pub pid: Pid,
    /// Why its namespace could not be read.
    pub reason: String,
}

/// Outcome of one enumeration.
#[derive(Debug, Clone, Default)]
pub struct Enumeration {
    /// Every distinct network namespace found, with one handle each.
    pub table: NamespaceTable,
    /// Processes skipped under [`ReadFailurePolicy::Skip`].
    pub skipped: Vec<SkippedProcess>,
}

/// Maps every live network namespace to a handle that can enter it.
///
/// When several processes share a namespace the last one seen provides the
/// handle; any of them is as good as the other for `setns(2)`. An empty
/// table is a valid result.
///
/// # Errors
///
/// Returns an error if the process table cannot be listed, or if a process
/// is unreadable and `policy` is [`ReadFailurePolicy::Abort`].
pub fn enumerate<P>(inspector: &P, policy: ReadFailurePolicy) -> Result<Enumeration>
where
    P: ProcessInspector + ?Sized,
{
    let mut enumeration = Enumeration::default();

    for pid in inspector.pids()? {
        match inspector.namespace_identity(pid, NamespaceKind::Net) {
            Ok(identity) => {
                let handle = inspector.namespace_handle(pid, NamespaceKind::Net);
                let _ = enumeration.table.insert(identity, handle);
            }
            Err(e)
                if policy == ReadFailurePolicy::Skip && e.is_recoverable_during_enumeration() =>
            {
                tracing::warn!(%pid, error = %e, "skipping process");
                enumeration.skipped.push(SkippedProcess {
                    pid,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    tracing::debug!(
        namespaces = enumeration.table.len(),
        skipped = enumeration.skipped.len(),
        "network namespaces enumerated"
    );
    Ok(enumeration)
}
