//! Arenas: the allocator collaborator that owns native storage.
//!
//! An [`Arena`] pairs a [`Scope`] with an allocation policy. Every block
//! it allocates is attached to the scope and freed when the scope
//! closes, so segments handed out by an arena never outlive their
//! storage.
//!
//! | Kind | Who may access | Released |
//! |---|---|---|
//! | confined | creating thread | `close()` or drop |
//! | shared | any thread | `close()` or drop, after in-flight accesses drain |
//! | auto | any thread | when the arena and all its segments are dropped |
//! | global | any thread | never |

use std::sync::OnceLock;

use tracing::{debug, warn};

use crate::allocator::SegmentAllocator;
use crate::config::ArenaConfig;
use crate::error::ArenaError;
use crate::raw::RawBlock;
use crate::scope::{Scope, ScopeKind};
use crate::segment::{Segment, SegmentKind};

static GLOBAL: OnceLock<Arena> = OnceLock::new();

/// An allocator whose blocks share one lifetime.
#[derive(Debug)]
pub struct Arena {
    scope: Scope,
    config: ArenaConfig,
}

// Compile-time assertion: Arena must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Arena>();
};

impl Arena {
    /// A confined arena owned by the calling thread.
    pub fn of_confined() -> Self {
        Self::build(ScopeKind::Confined, ArenaConfig::default())
    }

    /// A shared arena that any thread can use and close.
    pub fn of_shared() -> Self {
        Self::build(ScopeKind::Shared, ArenaConfig::default())
    }

    /// An arena released automatically once unreachable.
    pub fn of_auto() -> Self {
        Self::build(ScopeKind::Auto, ArenaConfig::default())
    }

    /// The process-wide arena. Its storage is never released.
    pub fn global() -> &'static Arena {
        GLOBAL.get_or_init(|| Self::build(ScopeKind::Global, ArenaConfig::default()))
    }

    /// An arena of `kind` with explicit configuration.
    ///
    /// # Errors
    ///
    /// [`ArenaError::InvalidConfig`] if `config` fails validation.
    pub fn with_config(kind: ScopeKind, config: ArenaConfig) -> Result<Self, ArenaError> {
        config.validate()?;
        Ok(Self::build(kind, config))
    }

    fn build(kind: ScopeKind, config: ArenaConfig) -> Self {
        let scope = Scope::new(kind, config.drain_spin_limit);
        debug!(scope = %scope.id(), kind = ?kind, "arena created");
        Self { scope, config }
    }

    /// The lifetime shared by every segment this arena allocates.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Kind of the arena's scope.
    pub fn kind(&self) -> ScopeKind {
        self.scope.kind()
    }

    /// Configuration in effect.
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// Allocate `byte_size` bytes aligned to `byte_alignment`.
    ///
    /// The block is zero-filled unless [`ArenaConfig::zero_memory`] is
    /// off. A zero-byte request succeeds and yields an empty segment.
    ///
    /// # Errors
    ///
    /// [`ArenaError::InvalidAlignment`], [`ArenaError::CapacityExceeded`],
    /// [`ArenaError::AllocationFailed`], or [`ArenaError::Access`] when
    /// the arena is closed or, for a confined arena, used off its owner
    /// thread.
    pub fn allocate(&self, byte_size: u64, byte_alignment: u64) -> Result<Segment, ArenaError> {
        if !byte_alignment.is_power_of_two() {
            return Err(ArenaError::InvalidAlignment {
                alignment: byte_alignment,
            });
        }
        if byte_size > self.config.max_alloc_bytes {
            return Err(ArenaError::CapacityExceeded {
                requested: byte_size,
                capacity: self.config.max_alloc_bytes,
            });
        }
        drop(self.scope.acquire()?);

        let block = RawBlock::allocate(byte_size, byte_alignment, self.config.zero_memory)?;
        let address = block.address();
        self.scope.attach_block(block)?;
        debug!(
            scope = %self.scope.id(),
            address,
            byte_size,
            byte_alignment,
            "arena allocation"
        );
        Ok(Segment::from_parts(
            address,
            byte_size,
            SegmentKind::Native,
            false,
            self.scope.clone(),
        ))
    }

    /// Close the arena, invalidating every segment it produced.
    ///
    /// Cleanup actions registered through reinterpretation run first, in
    /// registration order; then the storage is freed. For shared arenas
    /// this waits for accesses already in progress on other threads.
    ///
    /// # Errors
    ///
    /// [`ArenaError::NotCloseable`] for auto and global arenas;
    /// [`ArenaError::Access`] with `ScopeNotAlive` if already closed, or
    /// `WrongThread` when a confined arena is closed off its owner thread,
    /// or `ScopeInUse` when the calling thread is inside an access on one
    /// of the arena's segments.
    pub fn close(&self) -> Result<(), ArenaError> {
        let kind = self.kind();
        if !kind.is_closeable() {
            return Err(ArenaError::NotCloseable { kind });
        }
        self.scope.close()?;
        Ok(())
    }
}

impl SegmentAllocator for Arena {
    fn allocate(&self, byte_size: u64, byte_alignment: u64) -> Result<Segment, ArenaError> {
        Arena::allocate(self, byte_size, byte_alignment)
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        if !self.kind().is_closeable() || !self.scope.is_alive() {
            return;
        }
        if let Err(err) = self.scope.close_quietly() {
            // A confined arena dropped off its owner thread keeps its
            // storage until the last segment handle goes away.
            warn!(scope = %self.scope.id(), error = %err, "arena dropped without closing");
        }
    }
}
