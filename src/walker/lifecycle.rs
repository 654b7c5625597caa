//! Deferred release of container handles.
//!
//! A container hands out one [`Lease`] per emitted entry, and one per
//! running traversal. Its handle is dropped only once close was requested
//! *and* every lease came back. The party that makes both true performs the
//! release: `request_close` when nothing is outstanding, otherwise the last
//! lease. Nobody ever waits for it.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tracing::debug;

use crate::error::{Result, WalkError};

struct State<H> {
    handle: Option<Arc<H>>,
    pending: usize,
    emitted: usize,
    walking: usize,
    closing: bool,
}

impl<H> State<H> {
    fn idle(&self) -> bool {
        self.pending == 0 && self.walking == 0
    }
}

/// What a [`Lease`] holds its container open for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    Entry,
    Walk,
}

/// Pending-reference bookkeeping around a container's handle.
pub struct Lifecycle<H> {
    path: PathBuf,
    state: Mutex<State<H>>,
    released: Notify,
}

impl<H: Send + Sync + 'static> Lifecycle<H> {
    pub fn new(path: impl Into<PathBuf>, handle: H) -> Arc<Self> {
        Arc::new(Self {
            path: path.into(),
            state: Mutex::new(State {
                handle: Some(Arc::new(handle)),
                pending: 0,
                emitted: 0,
                walking: 0,
                closing: false,
            }),
            released: Notify::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Count one more emitted entry. `None` once the handle is gone.
    pub fn acquire(self: &Arc<Self>) -> Option<Lease> {
        self.claim(Claim::Entry)
    }

    /// Keep the handle for the duration of one traversal. The lease does
    /// not count as a pending entry.
    pub fn walk(self: &Arc<Self>) -> Option<Lease> {
        self.claim(Claim::Walk)
    }

    fn claim(self: &Arc<Self>, claim: Claim) -> Option<Lease> {
        if !self.add(claim) {
            return None;
        }
        let owner: Weak<dyn PendingCount> = Arc::downgrade(self) as Weak<dyn PendingCount>;
        Some(Lease {
            owner: Some(owner),
            claim,
        })
    }

    /// The shared handle, for reading member content.
    pub fn handle(&self) -> Result<Arc<H>> {
        self.state
            .lock()
            .handle
            .clone()
            .ok_or_else(|| WalkError::Released {
                path: self.path.clone(),
            })
    }

    /// Ask for the handle to be released. Returns at once.
    pub fn request_close(&self) {
        let handle = {
            let mut state = self.state.lock();
            if state.closing {
                return;
            }
            state.closing = true;
            if !state.idle() {
                debug!(
                    path = %self.path.display(),
                    pending = state.pending,
                    walking = state.walking,
                    "close deferred until entries are released"
                );
                return;
            }
            state.handle.take()
        };
        self.finish(handle);
    }

    pub fn pending(&self) -> usize {
        self.state.lock().pending
    }

    /// Entries handed out over the container's life.
    pub fn emitted(&self) -> usize {
        self.state.lock().emitted
    }

    pub fn is_closing(&self) -> bool {
        self.state.lock().closing
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().handle.is_none()
    }

    /// Resolve once the handle has been released.
    pub async fn released(&self) {
        loop {
            let notified = self.released.notified();
            if self.is_released() {
                return;
            }
            notified.await;
        }
    }

    fn finish(&self, handle: Option<Arc<H>>) {
        if let Some(handle) = handle {
            // Drop outside the lock: closing a file is a syscall
            drop(handle);
            debug!(path = %self.path.display(), "container released");
            self.released.notify_waiters();
        }
    }
}

trait PendingCount: Send + Sync {
    /// Count a new claim; false once the handle is gone.
    fn add(&self, claim: Claim) -> bool;

    fn release_one(&self, claim: Claim);
}

impl<H: Send + Sync + 'static> PendingCount for Lifecycle<H> {
    fn add(&self, claim: Claim) -> bool {
        let mut state = self.state.lock();
        if state.handle.is_none() {
            return false;
        }
        match claim {
            Claim::Entry => {
                state.pending += 1;
                state.emitted += 1;
            }
            Claim::Walk => state.walking += 1,
        }
        true
    }

    fn release_one(&self, claim: Claim) {
        let handle = {
            let mut state = self.state.lock();
            match claim {
                Claim::Entry => state.pending = state.pending.saturating_sub(1),
                Claim::Walk => state.walking = state.walking.saturating_sub(1),
            }
            if state.closing && state.idle() {
                state.handle.take()
            } else {
                None
            }
        };
        self.finish(handle);
    }
}

/// One entry's claim on its container.
///
/// Releasing is idempotent, and dropping an unreleased lease releases it,
/// so a container's counter can never be decremented twice for one entry
/// nor left hanging by a forgotten entry. The back-reference is weak: a
/// lease never keeps the container's bookkeeping alive.
pub struct Lease {
    owner: Option<Weak<dyn PendingCount>>,
    claim: Claim,
}

impl Lease {
    pub fn release(&mut self) {
        if let Some(owner) = self.owner.take().and_then(|weak| weak.upgrade()) {
            owner.release_one(self.claim);
        }
    }

    /// A second claim of the same kind on the same container. `None` if
    /// this lease was released or the handle is already gone.
    pub fn duplicate(&self) -> Option<Lease> {
        let weak = self.owner.as_ref()?;
        let owner = weak.upgrade()?;
        if !owner.add(self.claim) {
            return None;
        }
        Some(Lease {
            owner: Some(weak.clone()),
            claim: self.claim,
        })
    }

    pub fn is_released(&self) -> bool {
        self.owner.is_none()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("claim", &self.claim)
            .field("released", &self.is_released())
            .finish()
    }
}
