//! Formatted output for resolutions.

use vethpeer_core::PeerResolution;

/// Formats the resolved peer namespace as `netns ino ID for <if>: <inode>`.
#[must_use]
pub fn format_resolution(resolution: &PeerResolution) -> String {
    format!(
        "netns ino ID for {}: {}",
        resolution.interface, resolution.peer
    )
}

/// Formats the full resolution as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn format_json(resolution: &PeerResolution) -> serde_json::Result<String> {
    serde_json::to_string_pretty(resolution)
}
