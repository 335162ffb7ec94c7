//! Peer link inspection in the current network namespace.
//!
//! A veth endpoint whose peer lives in another namespace carries the
//! `link-netnsid` attribute: the ID the current namespace assigned to the
//! peer's namespace. That value is only meaningful here, in the namespace
//! that coined it.

use std::path::PathBuf;
use std::process::Command;

use serde::Deserialize;
use vethpeer_common::constants::{DEFAULT_IP_COMMAND, IFNAMSIZ_MAX};
use vethpeer_common::error::{Result, VethpeerError};
use vethpeer_common::types::RelativeNamespaceId;

/// Reads link attributes of interfaces in the current namespace.
pub trait LinkInspector {
    /// Returns the `link-netnsid` recorded for `interface`, or `None` if the
    /// interface is not linked into another namespace.
    ///
    /// # Errors
    ///
    /// Returns [`VethpeerError::LinkNotFound`] if there is no such interface,
    /// [`VethpeerError::Parse`] if the inspection output is not understood,
    /// and [`VethpeerError::LinkQueryFailed`] for any other failure.
    fn link_netnsid(&self, interface: &str) -> Result<Option<RelativeNamespaceId>>;
}

/// Checks that `name` can be a Linux interface name.
///
/// # Errors
///
/// Returns [`VethpeerError::InvalidInterfaceName`] otherwise.
pub fn validate_interface_name(name: &str) -> Result<()> {
    let reject = |reason| {
        Err(VethpeerError::InvalidInterfaceName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return reject("empty");
    }
    if name.len() > IFNAMSIZ_MAX {
        return reject("longer than 15 bytes");
    }
    if name == "." || name == ".." {
        return reject("reserved name");
    }
    if name.chars().any(|c| c == '/' || c == ':' || c.is_whitespace()) {
        return reject("contains '/', ':' or whitespace");
    }
    Ok(())
}

/// Returns the ID the current namespace uses for the namespace holding the
/// peer of `interface`.
///
/// # Errors
///
/// Returns [`VethpeerError::NoPeerLinkage`] if the interface exists but has
/// no peer in another namespace, or any error of the inspector.
pub fn resolve_peer_relative_id<L>(inspector: &L, interface: &str) -> Result<RelativeNamespaceId>
where
    L: LinkInspector + ?Sized,
{
    validate_interface_name(interface)?;

    let id = inspector
        .link_netnsid(interface)?
        .ok_or_else(|| VethpeerError::NoPeerLinkage {
            interface: interface.to_string(),
        })?;
    tracing::info!(interface, link_netnsid = %id, "read peer link-netnsid");
    Ok(id)
}

/// One entry of `ip --json link show`.
#[derive(Debug, Deserialize)]
struct IpLinkEntry {
    ifname: String,
    #[serde(default)]
    link_netnsid: Option<i64>,
}

/// Decodes the output of `ip --json link show dev <interface>`.
///
/// # Errors
///
/// Returns [`VethpeerError::Parse`] if the output is not a JSON array of
/// links, and [`VethpeerError::LinkNotFound`] if the array is empty.
pub fn decode_ip_link_json(interface: &str, output: &[u8]) -> Result<Option<RelativeNamespaceId>> {
    let entries: Vec<IpLinkEntry> =
        serde_json::from_slice(output).map_err(|e| VethpeerError::Parse {
            what: "ip link JSON output",
            message: format!("{e}\n{}", String::from_utf8_lossy(output)),
        })?;

    let entry = entries
        .into_iter()
        .next()
        .ok_or_else(|| VethpeerError::LinkNotFound {
            interface: interface.to_string(),
        })?;
    tracing::debug!(ifname = %entry.ifname, link_netnsid = ?entry.link_netnsid, "decoded link");

    Ok(entry.link_netnsid.and_then(RelativeNamespaceId::from_raw))
}

/// [`LinkInspector`] running `ip(8)` from iproute2.
#[derive(Debug, Clone)]
pub struct IpLink {
    program: PathBuf,
}

impl IpLink {
    /// Creates an inspector running the given `ip` binary.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for IpLink {
    fn default() -> Self {
        Self::new(DEFAULT_IP_COMMAND)
    }
}

impl LinkInspector for IpLink {
    fn link_netnsid(&self, interface: &str) -> Result<Option<RelativeNamespaceId>> {
        let failed = |message: String| VethpeerError::LinkQueryFailed {
            interface: interface.to_string(),
            message,
        };

        tracing::debug!(program = %self.program.display(), interface, "querying link");
        let output = Command::new(&self.program)
            .args(["--json", "link", "show", "dev", interface])
            .env("LC_ALL", "C")
            .output()
            .map_err(|e| failed(format!("{}: {e}", self.program.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("does not exist") {
                return Err(VethpeerError::LinkNotFound {
                    interface: interface.to_string(),
                });
            }
            return Err(failed(format!("{}\n{}", output.status, stderr.trim_end())));
        }

        decode_ip_link_json(interface, &output.stdout)
    }
}
