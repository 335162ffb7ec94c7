//! Domain primitive types used across the vethpeer workspace.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VethpeerError};

/// Host-unique identity of a namespace: its inode number on nsfs.
///
/// Every process living in the same namespace reports the same identity.
/// The value is only meaningful while the namespace exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceIdentity(u64);

impl NamespaceIdentity {
    /// Creates an identity from a raw inode number.
    #[must_use]
    pub const fn new(inode: u64) -> Self {
        Self(inode)
    }

    /// Returns the inode number.
    #[must_use]
    pub const fn inode(self) -> u64 {
        self.0
    }

    /// Parses the target of a `/proc/<pid>/ns/<kind>` link.
    ///
    /// The kernel formats those targets as `net:[4026531840]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the target does not have that shape or names a
    /// different namespace kind.
    pub fn from_link_target(kind: NamespaceKind, target: &str) -> Result<Self> {
        let malformed = |message: String| VethpeerError::Parse {
            what: "namespace link",
            message,
        };

        let inode = target
            .strip_prefix(kind.as_str())
            .and_then(|rest| rest.strip_prefix(":["))
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(|| malformed(format!("unexpected target {target:?} for {kind}")))?;

        inode
            .parse::<u64>()
            .map(Self)
            .map_err(|e| malformed(format!("bad inode in {target:?}: {e}")))
    }
}

impl fmt::Display for NamespaceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Filesystem path through which a namespace can be entered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceHandle(PathBuf);

impl NamespaceHandle {
    /// Creates a handle from a path such as `/proc/1234/ns/net`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Returns the underlying path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for NamespaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// All namespaces found during one enumeration, one handle per identity.
///
/// Built fresh for every resolution. Iteration order is unspecified.
pub type NamespaceTable = HashMap<NamespaceIdentity, NamespaceHandle>;

/// Identifier a namespace assigns locally to another namespace.
///
/// Two namespaces may use the same value for two unrelated targets, so a
/// value is only comparable with values coined by the same namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelativeNamespaceId(u32);

impl RelativeNamespaceId {
    /// Creates an identifier from an assigned, non-negative value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Interprets a raw kernel value, where any negative value means that no
    /// identifier is assigned.
    #[must_use]
    pub fn from_raw(raw: i64) -> Option<Self> {
        u32::try_from(raw).ok().map(Self)
    }

    /// Returns the identifier value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RelativeNamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Namespace kinds inspected under `/proc/<pid>/ns/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceKind {
    /// Network stack.
    Net,
}

impl NamespaceKind {
    /// Returns the file name under `/proc/<pid>/ns/`, which is also the
    /// prefix of its link target.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Net => "net",
        }
    }
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process identifier as listed in the proc filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pid(u32);

impl Pid {
    /// Creates a PID from a raw value.
    #[must_use]
    pub const fn new(pid: u32) -> Self {
        Self(pid)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
