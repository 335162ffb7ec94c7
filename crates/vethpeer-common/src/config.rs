//! Configuration model for a single resolution.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_IP_COMMAND, DEFAULT_PROC_ROOT};

/// What the enumerator does when one process's namespace cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadFailurePolicy {
    /// Log a warning, skip the process and keep scanning.
    ///
    /// Processes exit between the listing and the inspection all the time,
    /// so this is the default.
    #[default]
    Skip,
    /// Fail the whole enumeration on the first unreadable process.
    Abort,
}

/// Root configuration for a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Mount point of the proc filesystem to enumerate.
    pub proc_root: PathBuf,
    /// `ip(8)` binary used to inspect links.
    pub ip_command: PathBuf,
    /// Enumeration behavior on unreadable processes.
    pub read_failure_policy: ReadFailurePolicy,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from(DEFAULT_PROC_ROOT),
            ip_command: PathBuf::from(DEFAULT_IP_COMMAND),
            read_failure_policy: ReadFailurePolicy::default(),
        }
    }
}
