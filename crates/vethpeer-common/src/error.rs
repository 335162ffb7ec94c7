//! Unified error types for the vethpeer workspace.
//!
//! Every stage of a resolution reports through [`VethpeerError`]. Under the
//! skip policy, two failures are recovered from: an unreadable process
//! during enumeration, and a namespace handle that vanished before it could
//! be queried. Everything else ends the invocation.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum VethpeerError {
    /// An I/O operation on a namespace handle failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The process table itself could not be listed.
    #[error("cannot list processes under {path}: {source}")]
    ProcessListing {
        /// Proc root that was being listed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A process's namespace link could not be resolved.
    #[error("error resolving {pid}: {message}")]
    NamespaceRead {
        /// Process whose namespace link was read.
        pid: u32,
        /// Description of the failure.
        message: String,
    },

    /// The interface name cannot name a Linux network device.
    #[error("invalid interface name {name:?}: {reason}")]
    InvalidInterfaceName {
        /// Rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// No interface of that name exists in the current namespace.
    #[error("interface {interface} not found")]
    LinkNotFound {
        /// Interface that was looked up.
        interface: String,
    },

    /// The link inspection failed for another reason.
    #[error("failed to get link-netnsid from veth {interface}: {message}")]
    LinkQueryFailed {
        /// Interface that was looked up.
        interface: String,
        /// Description of the failure, including the tool's own output.
        message: String,
    },

    /// The interface exists but is not linked into another namespace.
    #[error("interface {interface} has no peer namespace linkage")]
    NoPeerLinkage {
        /// Interface that was looked up.
        interface: String,
    },

    /// Output of an inspection could not be interpreted.
    #[error("cannot parse {what}: {message}")]
    Parse {
        /// What was being parsed.
        what: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// The kernel refused a relative namespace identifier query.
    #[error("netns id query for {target} failed: {message}")]
    NsidQueryFailed {
        /// Namespace that was asked about.
        target: String,
        /// Description of the failure.
        message: String,
    },

    /// Entering or restoring a namespace context failed.
    #[error("cannot {action} network namespace {target}: {message}")]
    ContextSwitch {
        /// `enter`, `save` or `restore`.
        action: &'static str,
        /// Namespace involved in the switch.
        target: String,
        /// Description of the failure.
        message: String,
    },

    /// Correlation finished without finding the peer namespace.
    #[error("netns inode for {interface:?} not found")]
    PeerNotFound {
        /// Interface whose peer was searched.
        interface: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl VethpeerError {
    /// Whether the enumerator may skip the failing process and continue.
    ///
    /// Processes exiting between the listing and the inspection are expected,
    /// so a per-process read failure is recoverable. Any other failure means
    /// the question cannot be answered and stops the resolution.
    #[must_use]
    pub const fn is_recoverable_during_enumeration(&self) -> bool {
        matches!(self, Self::NamespaceRead { .. })
    }

    /// Whether the correlator may skip the namespace it was probing.
    ///
    /// Only a handle that no longer exists qualifies: its last process
    /// exited after the enumeration. A namespace that is still there but
    /// cannot be queried may be the peer, so that failure is fatal.
    #[must_use]
    pub fn is_vanished_handle(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, VethpeerError>;
