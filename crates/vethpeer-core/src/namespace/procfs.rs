//! Process table inspection through the proc filesystem.

use std::path::PathBuf;

use vethpeer_common::error::{Result, VethpeerError};
use vethpeer_common::types::{NamespaceHandle, NamespaceIdentity, NamespaceKind, Pid};

/// Read-only view of the host's processes and their namespaces.
pub trait ProcessInspector {
    /// Lists the processes alive at the time of the call.
    ///
    /// # Errors
    ///
    /// Returns an error if the process table cannot be listed at all.
    fn pids(&self) -> Result<Vec<Pid>>;

    /// Returns the identity of the namespace of `kind` the process lives in.
    ///
    /// # Errors
    ///
    /// Returns [`VethpeerError::NamespaceRead`] if the process is gone or
    /// its namespace link is not accessible.
    fn namespace_identity(&self, pid: Pid, kind: NamespaceKind) -> Result<NamespaceIdentity>;

    /// Returns a handle through which the process's namespace can be entered.
    fn namespace_handle(&self, pid: Pid, kind: NamespaceKind) -> NamespaceHandle;
}

/// [`ProcessInspector`] backed by a mounted proc filesystem.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    /// Creates an inspector reading the proc filesystem mounted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn ns_path(&self, pid: Pid, kind: NamespaceKind) -> PathBuf {
        self.root
            .join(pid.to_string())
            .join("ns")
            .join(kind.as_str())
    }
}

impl ProcessInspector for ProcFs {
    fn pids(&self) -> Result<Vec<Pid>> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| VethpeerError::ProcessListing {
            path: self.root.clone(),
            source: e,
        })?;

        let mut pids: Vec<Pid> = entries
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
            .map(Pid::new)
            .collect();
        pids.sort_unstable();

        tracing::debug!(root = %self.root.display(), count = pids.len(), "listed processes");
        Ok(pids)
    }

    fn namespace_identity(&self, pid: Pid, kind: NamespaceKind) -> Result<NamespaceIdentity> {
        let read_error = |message: String| VethpeerError::NamespaceRead {
            pid: pid.as_raw(),
            message,
        };

        let path = self.ns_path(pid, kind);
        let target = std::fs::read_link(&path)
            .map_err(|e| read_error(format!("readlink {}: {e}", path.display())))?;
        let target = target
            .to_str()
            .ok_or_else(|| read_error(format!("non UTF-8 link target at {}", path.display())))?;

        NamespaceIdentity::from_link_target(kind, target).map_err(|e| read_error(e.to_string()))
    }

    fn namespace_handle(&self, pid: Pid, kind: NamespaceKind) -> NamespaceHandle {
        NamespaceHandle::new(self.ns_path(pid, kind))
    }
}
