//! Correlation tests against a simulated host.
//!
//! The simulated host implements the three collaborators at once: a process
//! table, per-namespace link tables, and a thread context with a relation
//! `(from, to) -> nsid`. Every test checks that the thread ends up back in
//! the namespace it started in.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::cell::Cell;
use std::collections::HashMap;
use std::io;

use vethpeer_common::config::ReadFailurePolicy;
use vethpeer_common::error::{Result, VethpeerError};
use vethpeer_common::types::{
    NamespaceHandle, NamespaceIdentity, NamespaceKind, Pid, RelativeNamespaceId,
};
use vethpeer_core::correlate::{find_peer_namespace, find_peer_namespace_in};
use vethpeer_core::link::LinkInspector;
use vethpeer_core::namespace::{NetnsContext, ProcessInspector, enumerate};

const A: u64 = 100;
const B: u64 = 200;
const C: u64 = 300;

#[derive(Default)]
struct FakeHost {
    /// Namespace the simulated thread is in.
    current: Cell<u64>,
    /// Namespace the thread started in.
    origin: u64,
    /// `(pid, namespace)`; `None` for a process that vanished mid-scan.
    processes: Vec<(u32, Option<u64>)>,
    /// `(namespace, interface)` and the interface's link-netnsid.
    links: HashMap<(u64, String), Option<u32>>,
    /// nsid that namespace `.0` uses for namespace `.1`.
    nsids: HashMap<(u64, u64), u32>,
    /// Namespace whose handle is gone by the time it is queried.
    vanished: Option<u64>,
    /// Namespace for which the nsid query itself fails.
    fail_query_for: Option<u64>,
    fail_enter: Option<u64>,
    fail_restore: bool,
    pid_listings: Cell<usize>,
    queries: Cell<usize>,
    enters: Cell<usize>,
    restores: Cell<usize>,
}

impl FakeHost {
    fn new(origin: u64, namespaces: &[u64]) -> Self {
        let host = Self {
            origin,
            processes: namespaces
                .iter()
                .enumerate()
                .map(|(i, ns)| (u32::try_from(i).unwrap() + 1, Some(*ns)))
                .collect(),
            ..Self::default()
        };
        host.current.set(origin);
        host
    }

    /// Adds an interface to the namespace the thread starts in.
    fn with_link(self, name: &str, nsid: Option<u32>) -> Self {
        let origin = self.origin;
        self.with_link_in(origin, name, nsid)
    }

    fn with_link_in(mut self, ns: u64, name: &str, nsid: Option<u32>) -> Self {
        let _ = self.links.insert((ns, name.to_string()), nsid);
        self
    }

    fn with_nsid(mut self, from: u64, to: u64, nsid: u32) -> Self {
        let _ = self.nsids.insert((from, to), nsid);
        self
    }

    fn handle_inode(handle: &NamespaceHandle) -> u64 {
        handle
            .path()
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.parse().ok())
            .expect("fake handle")
    }

    fn assert_back_home(&self) {
        assert_eq!(self.current.get(), self.origin);
        assert_eq!(self.enters.get(), self.restores.get());
    }
}

fn handle_of(ns: u64) -> NamespaceHandle {
    NamespaceHandle::new(format!("/fake/{ns}"))
}

impl LinkInspector for FakeHost {
    fn link_netnsid(&self, interface: &str) -> Result<Option<RelativeNamespaceId>> {
        self.links
            .get(&(self.current.get(), interface.to_string()))
            .map(|nsid| nsid.map(RelativeNamespaceId::new))
            .ok_or_else(|| VethpeerError::LinkNotFound {
                interface: interface.to_string(),
            })
    }
}

impl ProcessInspector for FakeHost {
    fn pids(&self) -> Result<Vec<Pid>> {
        self.pid_listings.set(self.pid_listings.get() + 1);
        Ok(self.processes.iter().map(|(pid, _)| Pid::new(*pid)).collect())
    }

    fn namespace_identity(&self, pid: Pid, _: NamespaceKind) -> Result<NamespaceIdentity> {
        self.processes
            .iter()
            .find(|(p, _)| *p == pid.as_raw())
            .and_then(|(_, ns)| *ns)
            .map(NamespaceIdentity::new)
            .ok_or_else(|| VethpeerError::NamespaceRead {
                pid: pid.as_raw(),
                message: "No such file or directory".into(),
            })
    }

    fn namespace_handle(&self, pid: Pid, _: NamespaceKind) -> NamespaceHandle {
        let ns = self
            .processes
            .iter()
            .find(|(p, _)| *p == pid.as_raw())
            .and_then(|(_, ns)| *ns)
            .expect("handle of readable process");
        handle_of(ns)
    }
}

impl NetnsContext for FakeHost {
    type Saved = u64;

    fn save(&self) -> Result<u64> {
        Ok(self.current.get())
    }

    fn saved_identity(&self, saved: &u64) -> NamespaceIdentity {
        NamespaceIdentity::new(*saved)
    }

    fn enter(&self, handle: &NamespaceHandle) -> Result<()> {
        let target = Self::handle_inode(handle);
        if self.fail_enter == Some(target) {
            return Err(VethpeerError::ContextSwitch {
                action: "enter",
                target: handle.to_string(),
                message: "injected".into(),
            });
        }
        self.enters.set(self.enters.get() + 1);
        self.current.set(target);
        Ok(())
    }

    fn restore(&self, saved: &u64) -> Result<()> {
        if self.fail_restore {
            return Err(VethpeerError::ContextSwitch {
                action: "restore",
                target: saved.to_string(),
                message: "injected".into(),
            });
        }
        self.restores.set(self.restores.get() + 1);
        self.current.set(*saved);
        Ok(())
    }

    fn relative_id_of(&self, handle: &NamespaceHandle) -> Result<Option<RelativeNamespaceId>> {
        let to = Self::handle_inode(handle);
        if self.vanished == Some(to) {
            return Err(VethpeerError::Io {
                path: handle.path().to_path_buf(),
                source: io::Error::from(io::ErrorKind::NotFound),
            });
        }
        if self.fail_query_for == Some(to) {
            return Err(VethpeerError::NsidQueryFailed {
                target: handle.to_string(),
                message: "injected".into(),
            });
        }
        self.queries.set(self.queries.get() + 1);
        Ok(self
            .nsids
            .get(&(self.current.get(), to))
            .copied()
            .map(RelativeNamespaceId::new))
    }
}

fn resolve(host: &FakeHost, interface: &str) -> Result<NamespaceIdentity> {
    find_peer_namespace(host, host, host, interface, ReadFailurePolicy::Skip).map(|r| r.peer)
}

/// Origin A names B 3 and C 4; veth0 in A records 3.
///
/// B and C use unrelated numbers of their own: C happens to call A 3, and B
/// calls C 3.
fn three_namespace_host() -> FakeHost {
    FakeHost::new(A, &[A, B, C])
        .with_link("veth0", Some(3))
        .with_nsid(A, B, 3)
        .with_nsid(A, C, 4)
        .with_nsid(B, A, 0)
        .with_nsid(B, C, 3)
        .with_nsid(C, A, 3)
}

#[test]
fn resolves_peer_across_three_namespaces() {
    let host = three_namespace_host();
    let resolution =
        find_peer_namespace(&host, &host, &host, "veth0", ReadFailurePolicy::Skip).unwrap();

    assert_eq!(resolution.peer, NamespaceIdentity::new(B));
    assert_eq!(resolution.origin, NamespaceIdentity::new(A));
    assert_eq!(resolution.link_netnsid, RelativeNamespaceId::new(3));
    assert_eq!(resolution.candidates, 3);
    assert!(resolution.vanished.is_empty());
    assert_eq!(host.enters.get(), 0);
    host.assert_back_home();
}

#[test]
fn ids_coined_by_other_namespaces_do_not_match() {
    // C calls A 3 and B calls C 3; only A's own 3 counts.
    let host = three_namespace_host();
    assert_eq!(resolve(&host, "veth0").unwrap(), NamespaceIdentity::new(B));

    // Every candidate calls A 0; A calls C 1.
    let host = FakeHost::new(A, &[A, B, C])
        .with_link("veth1", Some(1))
        .with_nsid(A, B, 0)
        .with_nsid(A, C, 1)
        .with_nsid(B, A, 0)
        .with_nsid(C, A, 0);
    assert_eq!(resolve(&host, "veth1").unwrap(), NamespaceIdentity::new(C));
    host.assert_back_home();
}

#[test]
fn resolves_every_peer_of_a_fully_assigned_host() {
    let namespaces = [A, B, C, 400, 500];
    let n = namespaces.len();
    for (peer_index, peer) in namespaces.iter().enumerate().skip(1) {
        let mut host = FakeHost::new(A, &namespaces);
        for (from_index, from) in namespaces.iter().enumerate() {
            // Each namespace numbers the others with its own rotation of
            // 0..n, so every value is in use by several namespaces.
            for (to_index, to) in namespaces.iter().enumerate() {
                if from != to {
                    let nsid = u32::try_from((to_index + from_index) % n).unwrap();
                    host = host.with_nsid(*from, *to, nsid);
                }
            }
        }
        // The origin's rotation is the identity.
        let target = u32::try_from(peer_index).unwrap();
        host = host.with_link("veth0", Some(target));

        assert_eq!(
            resolve(&host, "veth0").unwrap(),
            NamespaceIdentity::new(*peer)
        );
        host.assert_back_home();
    }
}

#[test]
fn single_namespace_host_has_no_peer() {
    let host = FakeHost::new(A, &[A, A]).with_link("veth0", Some(0));
    assert!(matches!(
        resolve(&host, "veth0"),
        Err(VethpeerError::PeerNotFound { .. })
    ));
    assert_eq!(host.queries.get(), 0);
    assert_eq!(host.enters.get(), 0);
    host.assert_back_home();
}

#[test]
fn missing_interface_fails_before_enumeration() {
    let host = three_namespace_host();
    assert!(matches!(
        resolve(&host, "veth9"),
        Err(VethpeerError::LinkNotFound { .. })
    ));
    assert_eq!(host.pid_listings.get(), 0);
    assert_eq!(host.queries.get(), 0);
    host.assert_back_home();
}

#[test]
fn interface_without_peer_fails_before_enumeration() {
    let host = three_namespace_host().with_link("lo", None);
    assert!(matches!(
        resolve(&host, "lo"),
        Err(VethpeerError::NoPeerLinkage { .. })
    ));
    assert_eq!(host.pid_listings.get(), 0);
}

#[test]
fn unmatched_id_is_peer_not_found() {
    let host = three_namespace_host().with_link("veth1", Some(42));
    assert!(matches!(
        resolve(&host, "veth1"),
        Err(VethpeerError::PeerNotFound { .. })
    ));
    // One query per namespace other than the origin.
    assert_eq!(host.queries.get(), 2);
    assert_eq!(host.enters.get(), 0);
    host.assert_back_home();
}

#[test]
fn vanished_namespace_is_skipped() {
    let mut host = three_namespace_host();
    host.vanished = Some(C);

    let resolution =
        find_peer_namespace(&host, &host, &host, "veth0", ReadFailurePolicy::Skip).unwrap();
    assert_eq!(resolution.peer, NamespaceIdentity::new(B));
    assert!(resolution.vanished.iter().all(|ns| *ns == NamespaceIdentity::new(C)));
    host.assert_back_home();
}

#[test]
fn vanished_namespace_does_not_hide_unmatched_id() {
    let mut host = three_namespace_host().with_link("veth1", Some(42));
    host.vanished = Some(C);

    assert!(matches!(
        resolve(&host, "veth1"),
        Err(VethpeerError::PeerNotFound { .. })
    ));
    assert_eq!(host.queries.get(), 1);
}

#[test]
fn vanished_namespace_aborts_under_strict_policy() {
    let mut host = three_namespace_host().with_link("veth1", Some(42));
    host.vanished = Some(C);

    let err =
        find_peer_namespace(&host, &host, &host, "veth1", ReadFailurePolicy::Abort).unwrap_err();
    assert!(err.is_vanished_handle());
    host.assert_back_home();
}

#[test]
fn failed_query_is_fatal() {
    let mut host = three_namespace_host().with_link("veth1", Some(42));
    host.fail_query_for = Some(C);

    assert!(matches!(
        resolve(&host, "veth1"),
        Err(VethpeerError::NsidQueryFailed { .. })
    ));
    host.assert_back_home();
}

#[test]
fn origin_missing_from_process_table_is_not_a_candidate_anyway() {
    // Only B and C are visible, e.g. with hidepid or a foreign proc root.
    let mut host = three_namespace_host();
    host.processes = vec![(20, Some(B)), (30, Some(C))];

    let resolution =
        find_peer_namespace(&host, &host, &host, "veth0", ReadFailurePolicy::Skip).unwrap();
    assert_eq!(resolution.peer, NamespaceIdentity::new(B));
    assert_eq!(resolution.origin, NamespaceIdentity::new(A));
    assert_eq!(resolution.candidates, 2);
}

#[test]
fn unreadable_process_is_skipped_during_resolution() {
    let mut host = three_namespace_host();
    host.processes.push((77, None));

    let resolution =
        find_peer_namespace(&host, &host, &host, "veth0", ReadFailurePolicy::Skip).unwrap();
    assert_eq!(resolution.peer, NamespaceIdentity::new(B));
    assert_eq!(resolution.skipped.len(), 1);
    assert_eq!(resolution.skipped[0].pid, Pid::new(77));
}

#[test]
fn unreadable_process_aborts_under_strict_policy() {
    let mut host = three_namespace_host();
    host.processes.push((77, None));

    assert!(matches!(
        find_peer_namespace(&host, &host, &host, "veth0", ReadFailurePolicy::Abort),
        Err(VethpeerError::NamespaceRead { pid: 77, .. })
    ));
    assert_eq!(host.queries.get(), 0);
}

#[test]
fn enumeration_skips_one_of_five_processes() {
    let mut host = FakeHost::new(A, &[A, B, C, 400]);
    host.processes.insert(2, (99, None));
    assert_eq!(host.processes.len(), 5);

    let result = enumerate(&host, ReadFailurePolicy::Skip).unwrap();
    assert_eq!(result.table.len(), 4);
    assert_eq!(result.skipped.len(), 1);
}

/// [`three_namespace_host`] where B numbers A 0 and C 1, and B holds `eth0`
/// whose link-netnsid is 1.
fn host_with_interface_in_b() -> FakeHost {
    three_namespace_host()
        .with_nsid(B, C, 1)
        .with_link_in(B, "eth0", Some(1))
}

fn resolve_in(host: &FakeHost, netns: u64, interface: &str) -> Result<NamespaceIdentity> {
    find_peer_namespace_in(
        host,
        host,
        host,
        &handle_of(netns),
        interface,
        ReadFailurePolicy::Skip,
    )
    .map(|r| r.peer)
}

#[test]
fn resolves_from_another_namespace() {
    let host = host_with_interface_in_b();
    let resolution = find_peer_namespace_in(
        &host,
        &host,
        &host,
        &handle_of(B),
        "eth0",
        ReadFailurePolicy::Skip,
    )
    .unwrap();

    // B's own 1 is C; A calls C 4.
    assert_eq!(resolution.peer, NamespaceIdentity::new(C));
    assert_eq!(resolution.origin, NamespaceIdentity::new(B));
    assert_eq!(host.enters.get(), 1);
    host.assert_back_home();
}

#[test]
fn interface_is_looked_up_in_the_entered_namespace() {
    let host = host_with_interface_in_b();
    assert!(matches!(
        resolve_in(&host, B, "veth0"),
        Err(VethpeerError::LinkNotFound { .. })
    ));
    assert_eq!(host.pid_listings.get(), 0);
    host.assert_back_home();
}

#[test]
fn failed_enter_leaves_thread_in_origin() {
    let mut host = host_with_interface_in_b();
    host.fail_enter = Some(B);

    assert!(matches!(
        resolve_in(&host, B, "eth0"),
        Err(VethpeerError::ContextSwitch { action: "enter", .. })
    ));
    assert_eq!(host.pid_listings.get(), 0);
    host.assert_back_home();
}

#[test]
fn failed_restore_is_surfaced() {
    let mut host = host_with_interface_in_b();
    host.fail_restore = true;

    assert!(matches!(
        resolve_in(&host, B, "eth0"),
        Err(VethpeerError::ContextSwitch {
            action: "restore",
            ..
        })
    ));
}

#[test]
fn failed_restore_wins_over_failed_resolution() {
    let mut host = host_with_interface_in_b();
    host.fail_restore = true;

    assert!(matches!(
        resolve_in(&host, B, "veth9"),
        Err(VethpeerError::ContextSwitch {
            action: "restore",
            ..
        })
    ));
}

#[test]
fn failed_resolution_in_another_namespace_restores_origin() {
    let mut host = host_with_interface_in_b();
    host.fail_query_for = Some(C);

    assert!(matches!(
        resolve_in(&host, B, "eth0"),
        Err(VethpeerError::NsidQueryFailed { .. })
    ));
    host.assert_back_home();
}
