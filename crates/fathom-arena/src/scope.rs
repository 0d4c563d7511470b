//! Scope lifetime tracking.
//!
//! A [`Scope`] is the temporal half of a segment's safety contract: a
//! segment is accessible only while its scope is alive. Scopes come in
//! four kinds:
//!
//! - **Confined:** owned by the creating thread. Every access and the
//!   close itself must happen on that thread, so liveness needs no
//!   synchronization beyond a plain atomic load.
//! - **Shared:** accessible from any thread. Accesses bracket themselves
//!   with an active-access counter ([`ScopeGuard`]); `close` flips the
//!   state to closing, drains the counter, then commits.
//! - **Auto:** never closed explicitly; storage is released when the last
//!   handle to the scope is dropped.
//! - **Global:** never closed.
//!
//! Closing runs the registered cleanup actions in registration order and
//! then releases the arena blocks attached to the scope. A thread that is
//! inside an access on a scope (for example a file mapping callback)
//! cannot close that scope: the close fails with `ScopeInUse` instead of
//! waiting for itself.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use fathom_core::{ScopeId, SegmentError};
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, error};

use crate::raw::RawBlock;

const ALIVE: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

thread_local! {
    /// Closeable scopes the current thread is inside, with nesting depth.
    static HELD: RefCell<SmallVec<[(ScopeId, u32); 4]>> = RefCell::new(SmallVec::new());
}

fn enter_held(id: ScopeId) {
    let _ = HELD.try_with(|held| {
        let mut held = held.borrow_mut();
        match held.iter_mut().find(|(scope, _)| *scope == id) {
            Some((_, depth)) => *depth += 1,
            None => held.push((id, 1)),
        }
    });
}

fn leave_held(id: ScopeId) {
    let _ = HELD.try_with(|held| {
        let mut held = held.borrow_mut();
        if let Some(pos) = held.iter().position(|(scope, _)| *scope == id) {
            held[pos].1 -= 1;
            if held[pos].1 == 0 {
                held.swap_remove(pos);
            }
        }
    });
}

fn is_held(id: ScopeId) -> bool {
    HELD.try_with(|held| held.borrow().iter().any(|(scope, _)| *scope == id))
        .unwrap_or(false)
}

/// Thread and lifetime discipline of a scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// Single owner thread, explicit close.
    Confined,
    /// Any thread, explicit close with drain.
    Shared,
    /// Any thread, released when unreachable.
    Auto,
    /// Any thread, never released.
    Global,
}

impl ScopeKind {
    /// Whether scopes of this kind can be closed explicitly.
    pub fn is_closeable(self) -> bool {
        matches!(self, Self::Confined | Self::Shared)
    }
}

/// Deferred work run when a scope closes.
pub(crate) type CloseAction = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct Resources {
    actions: SmallVec<[CloseAction; 4]>,
    blocks: Vec<RawBlock>,
}

impl Resources {
    fn block_bytes(&self) -> u64 {
        self.blocks.iter().map(RawBlock::byte_size).sum()
    }
}

struct ScopeInner {
    id: ScopeId,
    kind: ScopeKind,
    owner: Option<ThreadId>,
    state: AtomicU8,
    /// In-flight accesses. Only maintained for shared scopes.
    active: AtomicUsize,
    drain_spin_limit: u32,
    resources: Mutex<Resources>,
}

// Compile-time assertion: ScopeInner must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<ScopeInner>();
};

/// A lifetime shared by a family of segments.
///
/// Cloning a `Scope` produces another handle to the same lifetime;
/// equality and hashing follow that identity.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    pub(crate) fn new(kind: ScopeKind, drain_spin_limit: u32) -> Self {
        let owner = match kind {
            ScopeKind::Confined => Some(thread::current().id()),
            _ => None,
        };
        Self {
            inner: Arc::new(ScopeInner {
                id: ScopeId::next(),
                kind,
                owner,
                state: AtomicU8::new(ALIVE),
                active: AtomicUsize::new(0),
                drain_spin_limit,
                resources: Mutex::new(Resources::default()),
            }),
        }
    }

    /// A fresh scope that is alive forever and holds no storage.
    ///
    /// Used for heap segments and for segments wrapping raw addresses.
    pub(crate) fn always_alive() -> Self {
        Self::new(ScopeKind::Global, 0)
    }

    /// Unique identity of this lifetime.
    pub fn id(&self) -> ScopeId {
        self.inner.id
    }

    /// Thread and lifetime discipline.
    pub fn kind(&self) -> ScopeKind {
        self.inner.kind
    }

    /// The owning thread of a confined scope.
    pub fn owner_thread(&self) -> Option<ThreadId> {
        self.inner.owner
    }

    /// Whether segments of this scope can still be accessed.
    ///
    /// Becomes `false` as soon as a close begins, before in-flight
    /// accesses have drained.
    pub fn is_alive(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == ALIVE
    }

    /// Whether `thread` may access segments of this scope.
    pub fn is_accessible_by(&self, thread: ThreadId) -> bool {
        self.inner.owner.map_or(true, |owner| owner == thread)
    }

    /// Check liveness then confinement, and enter the scope.
    ///
    /// For shared scopes the returned guard keeps `close` from committing
    /// until it is dropped.
    pub(crate) fn acquire(&self) -> Result<ScopeGuard<'_>, SegmentError> {
        let inner = &*self.inner;
        match inner.kind {
            ScopeKind::Confined => {
                if inner.state.load(Ordering::Acquire) != ALIVE {
                    return Err(SegmentError::ScopeNotAlive);
                }
                self.check_owner()?;
                enter_held(inner.id);
                Ok(ScopeGuard {
                    active: None,
                    held: Some(inner.id),
                })
            }
            ScopeKind::Shared => {
                // Announce first, then look: a closer that flipped the state
                // before our increment will wait for us to back out.
                inner.active.fetch_add(1, Ordering::SeqCst);
                if inner.state.load(Ordering::SeqCst) != ALIVE {
                    inner.active.fetch_sub(1, Ordering::SeqCst);
                    return Err(SegmentError::ScopeNotAlive);
                }
                enter_held(inner.id);
                Ok(ScopeGuard {
                    active: Some(&inner.active),
                    held: Some(inner.id),
                })
            }
            ScopeKind::Auto | ScopeKind::Global => Ok(ScopeGuard {
                active: None,
                held: None,
            }),
        }
    }

    /// Liveness only, without entering the scope.
    pub(crate) fn check_alive(&self) -> Result<(), SegmentError> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(SegmentError::ScopeNotAlive)
        }
    }

    fn check_owner(&self) -> Result<(), SegmentError> {
        match self.inner.owner {
            Some(owner) if owner != thread::current().id() => Err(SegmentError::WrongThread),
            _ => Ok(()),
        }
    }

    /// Register work to run when the scope closes.
    pub(crate) fn add_close_action(&self, action: CloseAction) -> Result<(), SegmentError> {
        self.check_owner()?;
        let mut resources = self.inner.resources.lock();
        // Checked under the lock so that a concurrent close either sees
        // this action or we see its state change.
        if self.inner.state.load(Ordering::Acquire) != ALIVE {
            return Err(SegmentError::ScopeNotAlive);
        }
        resources.actions.push(action);
        Ok(())
    }

    /// Hand a block to the scope; it is freed when the scope closes.
    pub(crate) fn attach_block(&self, block: RawBlock) -> Result<(), SegmentError> {
        self.check_owner()?;
        let mut resources = self.inner.resources.lock();
        if self.inner.state.load(Ordering::Acquire) != ALIVE {
            return Err(SegmentError::ScopeNotAlive);
        }
        resources.blocks.push(block);
        Ok(())
    }

    /// Close the scope, run its cleanup actions and free its blocks.
    ///
    /// If a cleanup action panics, the remaining actions still run, the
    /// storage is still released, and the first panic is then resumed.
    pub(crate) fn close(&self) -> Result<(), SegmentError> {
        self.begin_close()?;
        if let Some(payload) = self.inner.release() {
            panic::resume_unwind(payload);
        }
        Ok(())
    }

    /// Like [`close`](Self::close), but cleanup panics are only logged.
    pub(crate) fn close_quietly(&self) -> Result<(), SegmentError> {
        self.begin_close()?;
        drop(self.inner.release());
        Ok(())
    }

    fn begin_close(&self) -> Result<(), SegmentError> {
        let inner = &*self.inner;
        match inner.kind {
            ScopeKind::Confined => {
                if inner.state.load(Ordering::Acquire) != ALIVE {
                    return Err(SegmentError::ScopeNotAlive);
                }
                self.check_owner()?;
                if is_held(inner.id) {
                    return Err(SegmentError::ScopeInUse);
                }
                inner.state.store(CLOSING, Ordering::Release);
                Ok(())
            }
            ScopeKind::Shared => {
                // Draining would wait for this very thread.
                if is_held(inner.id) {
                    return Err(SegmentError::ScopeInUse);
                }
                inner
                    .state
                    .compare_exchange(ALIVE, CLOSING, Ordering::SeqCst, Ordering::SeqCst)
                    .map_err(|_| SegmentError::ScopeNotAlive)?;
                inner.drain();
                Ok(())
            }
            ScopeKind::Auto | ScopeKind::Global => Err(SegmentError::illegal_argument(format!(
                "{:?} scopes cannot be closed",
                inner.kind
            ))),
        }
    }
}

impl ScopeInner {
    /// Wait until every access that entered before the state flip leaves.
    fn drain(&self) {
        let mut spins = 0u32;
        while self.active.load(Ordering::SeqCst) != 0 {
            if spins < self.drain_spin_limit {
                spins += 1;
                std::hint::spin_loop();
            } else {
                thread::yield_now();
            }
        }
    }

    /// Commit the close and release everything. Returns the first
    /// cleanup panic, if any.
    fn release(&self) -> Option<Box<dyn std::any::Any + Send>> {
        let resources = {
            let mut guard = self.resources.lock();
            self.state.store(CLOSED, Ordering::Release);
            std::mem::take(&mut *guard)
        };
        self.run_and_free(resources)
    }

    fn run_and_free(&self, resources: Resources) -> Option<Box<dyn std::any::Any + Send>> {
        let Resources { actions, blocks } = resources;
        let action_count = actions.len();
        let bytes: u64 = blocks.iter().map(RawBlock::byte_size).sum();

        let mut first_panic = None;
        for action in actions {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(action)) {
                error!(scope = %self.id, "cleanup action panicked");
                first_panic.get_or_insert(payload);
            }
        }
        drop(blocks);

        debug!(
            scope = %self.id,
            kind = ?self.kind,
            actions = action_count,
            bytes_released = bytes,
            "scope closed"
        );
        first_panic
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        // Auto scopes, and closeable scopes whose arena leaked, end here.
        if *self.state.get_mut() == CLOSED {
            return;
        }
        *self.state.get_mut() = CLOSED;
        let resources = std::mem::take(self.resources.get_mut());
        if resources.actions.is_empty() && resources.blocks.is_empty() {
            return;
        }
        drop(self.run_and_free(resources));
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Scope {}

impl Hash for Scope {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let held = self.inner.resources.lock().block_bytes();
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("alive", &self.is_alive())
            .field("held_bytes", &held)
            .finish()
    }
}

/// RAII marker for an access in progress.
///
/// Dropping the guard lets a pending shared close proceed.
pub(crate) struct ScopeGuard<'a> {
    active: Option<&'a AtomicUsize>,
    held: Option<ScopeId>,
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.held {
            leave_held(id);
        }
        if let Some(active) = self.active {
            active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
