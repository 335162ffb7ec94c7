//! Cross-namespace correlation of a veth peer.
//!
//! The `link-netnsid` of an interface is an ID coined by the namespace the
//! interface lives in, and IDs are only comparable with other IDs coined by
//! that same namespace. The correlator therefore asks the origin namespace
//! which ID it uses for every other namespace on the host and picks the one
//! that reproduces the `link-netnsid`. A namespace assigns each ID to at most
//! one peer, so the first match is the only one.
//!
//! [`find_peer_namespace_in`] runs the same procedure from inside another
//! namespace, on the calling thread, which is put back afterwards.

use serde::Serialize;
use vethpeer_common::config::{ReadFailurePolicy, ResolverConfig};
use vethpeer_common::error::{Result, VethpeerError};
use vethpeer_common::types::{NamespaceHandle, NamespaceIdentity, RelativeNamespaceId};

use crate::link::{IpLink, LinkInspector, resolve_peer_relative_id};
use crate::namespace::{
    ContextToken, Enumeration, NetnsContext, ProcFs, ProcessInspector, SetnsContext,
    SkippedProcess, enumerate,
};

/// Outcome of a successful correlation.
#[derive(Debug, Clone, Serialize)]
pub struct PeerResolution {
    /// Interface that was resolved.
    pub interface: String,
    /// ID the origin namespace uses for the peer namespace.
    pub link_netnsid: RelativeNamespaceId,
    /// Namespace the resolution started from.
    pub origin: NamespaceIdentity,
    /// Namespace holding the other end of the veth pair.
    pub peer: NamespaceIdentity,
    /// Number of namespaces found on the host.
    pub candidates: usize,
    /// Processes left out of the enumeration.
    pub skipped: Vec<SkippedProcess>,
    /// Namespaces whose handle vanished before they could be probed.
    pub vanished: Vec<NamespaceIdentity>,
}

/// Resolves veth peers with a given set of collaborators.
#[derive(Debug, Clone)]
pub struct Resolver<L, P, C> {
    links: L,
    processes: P,
    context: C,
    policy: ReadFailurePolicy,
}

impl Resolver<IpLink, ProcFs, SetnsContext> {
    /// Creates a resolver inspecting the live system.
    #[must_use]
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::new(
            IpLink::new(&config.ip_command),
            ProcFs::new(&config.proc_root),
            SetnsContext::new(),
            config.read_failure_policy,
        )
    }
}

impl<L, P, C> Resolver<L, P, C>
where
    L: LinkInspector,
    P: ProcessInspector,
    C: NetnsContext,
{
    /// Creates a resolver from its collaborators.
    pub const fn new(links: L, processes: P, context: C, policy: ReadFailurePolicy) -> Self {
        Self {
            links,
            processes,
            context,
            policy,
        }
    }

    /// Finds the namespace holding the peer of `interface`.
    ///
    /// # Errors
    ///
    /// See [`find_peer_namespace`].
    pub fn find_peer_namespace(&self, interface: &str) -> Result<PeerResolution> {
        find_peer_namespace(
            &self.links,
            &self.processes,
            &self.context,
            interface,
            self.policy,
        )
    }

    /// Finds the peer of `interface` as seen from the namespace behind
    /// `netns`.
    ///
    /// # Errors
    ///
    /// See [`find_peer_namespace_in`].
    pub fn find_peer_namespace_in(
        &self,
        netns: &NamespaceHandle,
        interface: &str,
    ) -> Result<PeerResolution> {
        find_peer_namespace_in(
            &self.links,
            &self.processes,
            &self.context,
            netns,
            interface,
            self.policy,
        )
    }
}

/// Finds the namespace holding the peer of `interface`.
///
/// The link is inspected before anything else, so a missing interface fails
/// before the process table is read. Every probe runs in the namespace the
/// calling thread is in; no context switch happens.
///
/// Under [`ReadFailurePolicy::Skip`], a namespace whose handle vanished
/// between the enumeration and its probe is skipped and listed in
/// [`PeerResolution::vanished`].
///
/// # Errors
///
/// Returns the link inspection and enumeration errors, any other probe
/// error, and [`VethpeerError::PeerNotFound`] if no namespace matches.
pub fn find_peer_namespace<L, P, C>(
    links: &L,
    processes: &P,
    context: &C,
    interface: &str,
    policy: ReadFailurePolicy,
) -> Result<PeerResolution>
where
    L: LinkInspector + ?Sized,
    P: ProcessInspector + ?Sized,
    C: NetnsContext + ?Sized,
{
    let target = resolve_peer_relative_id(links, interface)?;
    let Enumeration { table, skipped } = enumerate(processes, policy)?;

    let token = ContextToken::save(context)?;
    let origin = token.identity();
    tracing::debug!(
        interface,
        %target,
        %origin,
        namespaces = table.len(),
        "correlating peer namespace"
    );

    let mut vanished = Vec::new();
    for (&candidate, handle) in &table {
        if candidate == origin {
            continue;
        }

        let id = match token.relative_id_of(handle) {
            Ok(id) => id,
            Err(e) if policy == ReadFailurePolicy::Skip && e.is_vanished_handle() => {
                tracing::warn!(%candidate, error = %e, "skipping vanished namespace");
                vanished.push(candidate);
                continue;
            }
            Err(e) => return Err(e),
        };
        tracing::trace!(%origin, to = %candidate, id = ?id, "probed");

        if id == Some(target) {
            tracing::debug!(interface, peer = %candidate, "peer namespace found");
            return Ok(PeerResolution {
                interface: interface.to_string(),
                link_netnsid: target,
                origin,
                peer: candidate,
                candidates: table.len(),
                skipped,
                vanished,
            });
        }
    }

    Err(VethpeerError::PeerNotFound {
        interface: interface.to_string(),
    })
}

/// Finds the peer of `interface` as seen from the namespace behind `netns`.
///
/// The calling thread enters `netns`, runs [`find_peer_namespace`] there,
/// including the link inspection, and goes back to the namespace it started
/// in before returning.
///
/// # Errors
///
/// Returns [`VethpeerError::ContextSwitch`] if `netns` cannot be entered or
/// left, and otherwise the errors of [`find_peer_namespace`]. A failure to
/// go back takes precedence over the resolution's own failure.
pub fn find_peer_namespace_in<L, P, C>(
    links: &L,
    processes: &P,
    context: &C,
    netns: &NamespaceHandle,
    interface: &str,
    policy: ReadFailurePolicy,
) -> Result<PeerResolution>
where
    L: LinkInspector + ?Sized,
    P: ProcessInspector + ?Sized,
    C: NetnsContext + ?Sized,
{
    let mut token = ContextToken::save(context)?;
    let entered = token.enter(netns)?;
    let resolved = find_peer_namespace(links, processes, context, interface, policy);

    match (resolved, entered.restore()) {
        (resolved, Ok(())) => resolved,
        (resolved, Err(e)) => {
            if let Err(resolve_error) = resolved {
                tracing::error!(%netns, error = %resolve_error, "resolution failed");
            }
            Err(e)
        }
    }
}
