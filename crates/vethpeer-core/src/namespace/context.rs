//! The calling thread's network namespace context.
//!
//! `setns(2)` with `CLONE_NEWNET` moves only the calling thread, and the
//! move sticks until the thread moves again. Visiting another namespace is
//! therefore done through a [`ContextToken`] saved once on the thread that
//! performs the visit, and an [`EnteredNamespace`] guard that puts the
//! thread back on every exit path. nsid queries are answered by the
//! namespace the thread is in when they run.

use std::fs::File;
use std::marker::PhantomData;
use std::os::fd::AsFd;
use std::os::unix::fs::MetadataExt;

use vethpeer_common::constants::THREAD_SELF_NETNS;
use vethpeer_common::error::{Result, VethpeerError};
use vethpeer_common::types::{NamespaceHandle, NamespaceIdentity, RelativeNamespaceId};

#[cfg(target_os = "linux")]
use super::nsid;

/// Reads and changes the network namespace of the calling thread.
pub trait NetnsContext {
    /// A saved context the thread can be put back into.
    type Saved;

    /// Captures the namespace the calling thread is currently in.
    ///
    /// # Errors
    ///
    /// Returns [`VethpeerError::ContextSwitch`] if the current namespace
    /// cannot be captured.
    fn save(&self) -> Result<Self::Saved>;

    /// Returns the identity of a saved namespace.
    fn saved_identity(&self, saved: &Self::Saved) -> NamespaceIdentity;

    /// Moves the calling thread into the namespace behind `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`VethpeerError::ContextSwitch`] if the thread could not be
    /// moved; the thread then stays where it was.
    fn enter(&self, handle: &NamespaceHandle) -> Result<()>;

    /// Moves the calling thread back into a saved namespace.
    ///
    /// # Errors
    ///
    /// Returns [`VethpeerError::ContextSwitch`] if the thread could not be
    /// moved back.
    fn restore(&self, saved: &Self::Saved) -> Result<()>;

    /// Returns the identifier the current namespace uses for the namespace
    /// behind `handle`, or `None` if it has none.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle cannot be opened or the query fails.
    /// [`VethpeerError::Io`] with [`std::io::ErrorKind::NotFound`] means the
    /// handle vanished.
    fn relative_id_of(&self, handle: &NamespaceHandle) -> Result<Option<RelativeNamespaceId>>;
}

/// The namespace a thread started in, saved before any switch.
///
/// Not `Clone` and not `Send`: it must be used on the thread that saved it.
pub struct ContextToken<'c, C: NetnsContext + ?Sized> {
    ctx: &'c C,
    saved: C::Saved,
    identity: NamespaceIdentity,
    _thread: PhantomData<*const ()>,
}

impl<'c, C: NetnsContext + ?Sized> ContextToken<'c, C> {
    /// Saves the calling thread's current namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the current namespace cannot be captured.
    pub fn save(ctx: &'c C) -> Result<Self> {
        let saved = ctx.save()?;
        let identity = ctx.saved_identity(&saved);
        tracing::debug!(%identity, "saved network namespace context");
        Ok(Self {
            ctx,
            saved,
            identity,
            _thread: PhantomData,
        })
    }

    /// Identity of the saved namespace.
    #[must_use]
    pub const fn identity(&self) -> NamespaceIdentity {
        self.identity
    }

    /// Identifier the saved namespace uses for the namespace behind
    /// `handle`.
    ///
    /// Borrowing the token rules out a live [`EnteredNamespace`], so the
    /// thread is in the saved namespace and the answer is its own.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle cannot be opened or the query fails.
    pub fn relative_id_of(&self, handle: &NamespaceHandle) -> Result<Option<RelativeNamespaceId>> {
        self.ctx.relative_id_of(handle)
    }

    /// Moves the thread into the namespace behind `handle` until the
    /// returned guard is restored or dropped.
    ///
    /// # Errors
    ///
    /// Returns [`VethpeerError::ContextSwitch`] if the namespace cannot be
    /// entered. No guard exists in that case and nothing needs restoring.
    pub fn enter<'t>(
        &'t mut self,
        handle: &NamespaceHandle,
    ) -> Result<EnteredNamespace<'t, 'c, C>> {
        self.ctx.enter(handle)?;
        tracing::debug!(%handle, "entered network namespace");
        Ok(EnteredNamespace {
            token: self,
            handle: handle.clone(),
            restored: false,
        })
    }
}

/// The thread is inside another namespace while this guard lives.
///
/// [`EnteredNamespace::restore`] goes back explicitly and reports failures.
/// Dropping the guard goes back too, logging any failure.
pub struct EnteredNamespace<'t, 'c, C: NetnsContext + ?Sized> {
    token: &'t mut ContextToken<'c, C>,
    handle: NamespaceHandle,
    restored: bool,
}

impl<C: NetnsContext + ?Sized> EnteredNamespace<'_, '_, C> {
    /// Moves the thread back into the saved namespace.
    ///
    /// # Errors
    ///
    /// Returns [`VethpeerError::ContextSwitch`] if the thread could not be
    /// moved back.
    pub fn restore(mut self) -> Result<()> {
        self.restored = true;
        self.token.ctx.restore(&self.token.saved)?;
        tracing::debug!(from = %self.handle, "restored network namespace");
        Ok(())
    }
}

impl<C: NetnsContext + ?Sized> Drop for EnteredNamespace<'_, '_, C> {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        if let Err(e) = self.token.ctx.restore(&self.token.saved) {
            tracing::error!(
                from = %self.handle,
                origin = %self.token.identity,
                error = %e,
                "failed to restore network namespace"
            );
        }
    }
}

/// A saved network namespace: an open nsfs file and its identity.
#[derive(Debug)]
pub struct SavedNetns {
    file: File,
    identity: NamespaceIdentity,
}

/// [`NetnsContext`] switching the calling thread with `setns(2)` and
/// querying nsids over rtnetlink.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetnsContext;

impl SetnsContext {
    /// Creates the Linux namespace context.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn switch_error(
    action: &'static str,
    target: impl ToString,
    message: impl ToString,
) -> VethpeerError {
    VethpeerError::ContextSwitch {
        action,
        target: target.to_string(),
        message: message.to_string(),
    }
}

#[cfg(target_os = "linux")]
impl NetnsContext for SetnsContext {
    type Saved = SavedNetns;

    fn save(&self) -> Result<SavedNetns> {
        let file =
            File::open(THREAD_SELF_NETNS).map_err(|e| switch_error("save", THREAD_SELF_NETNS, e))?;
        let identity = file
            .metadata()
            .map(|m| NamespaceIdentity::new(m.ino()))
            .map_err(|e| switch_error("save", THREAD_SELF_NETNS, e))?;
        Ok(SavedNetns { file, identity })
    }

    fn saved_identity(&self, saved: &SavedNetns) -> NamespaceIdentity {
        saved.identity
    }

    fn enter(&self, handle: &NamespaceHandle) -> Result<()> {
        use nix::sched::{CloneFlags, setns};

        let file = File::open(handle.path()).map_err(|e| switch_error("enter", handle, e))?;
        setns(&file, CloneFlags::CLONE_NEWNET).map_err(|e| switch_error("enter", handle, e))
    }

    fn restore(&self, saved: &SavedNetns) -> Result<()> {
        use nix::sched::{CloneFlags, setns};

        setns(&saved.file, CloneFlags::CLONE_NEWNET)
            .map_err(|e| switch_error("restore", saved.identity, e))
    }

    fn relative_id_of(&self, handle: &NamespaceHandle) -> Result<Option<RelativeNamespaceId>> {
        let file = File::open(handle.path()).map_err(|e| VethpeerError::Io {
            path: handle.path().to_path_buf(),
            source: e,
        })?;
        nsid::query(file.as_fd(), &handle.to_string())
    }
}

/// Stub for non-Linux platforms.
#[cfg(not(target_os = "linux"))]
impl NetnsContext for SetnsContext {
    type Saved = SavedNetns;

    fn save(&self) -> Result<SavedNetns> {
        Err(switch_error("save", THREAD_SELF_NETNS, "Linux required"))
    }

    fn saved_identity(&self, saved: &SavedNetns) -> NamespaceIdentity {
        saved.identity
    }

    fn enter(&self, handle: &NamespaceHandle) -> Result<()> {
        Err(switch_error("enter", handle, "Linux required"))
    }

    fn restore(&self, saved: &SavedNetns) -> Result<()> {
        Err(switch_error("restore", saved.identity, "Linux required"))
    }

    fn relative_id_of(&self, handle: &NamespaceHandle) -> Result<Option<RelativeNamespaceId>> {
        Err(VethpeerError::NsidQueryFailed {
            target: handle.to_string(),
            message: "Linux required".into(),
        })
    }
}
