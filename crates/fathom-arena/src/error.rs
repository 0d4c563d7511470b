//! Arena-specific error types.

use fathom_core::SegmentError;
use thiserror::Error;

use crate::scope::ScopeKind;

/// Errors that can occur while allocating from or closing an arena.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ArenaError {
    /// The request exceeds the arena's per-allocation cap.
    #[error("arena capacity exceeded: requested {requested} bytes, capacity {capacity} bytes")]
    CapacityExceeded {
        /// Number of bytes requested.
        requested: u64,
        /// Largest allocation the arena accepts.
        capacity: u64,
    },
    /// The requested alignment is zero or not a power of two.
    #[error("invalid alignment {alignment}: must be a power of two")]
    InvalidAlignment {
        /// The rejected alignment.
        alignment: u64,
    },
    /// The system allocator could not satisfy the request.
    #[error("allocation of {byte_size} bytes aligned to {alignment} failed")]
    AllocationFailed {
        /// Number of bytes requested.
        byte_size: u64,
        /// Alignment requested.
        alignment: u64,
    },
    /// `close` was called on an arena whose scope cannot be closed.
    #[error("{kind:?} arenas cannot be closed explicitly")]
    NotCloseable {
        /// Kind of the arena's scope.
        kind: ScopeKind,
    },
    /// A configuration value is out of range.
    #[error("invalid arena config: {reason}")]
    InvalidConfig {
        /// Description of the problem.
        reason: String,
    },
    /// The arena's scope rejected the operation (closed, wrong thread,
    /// or a bounds/alignment failure while initializing a segment).
    #[error(transparent)]
    Access(#[from] SegmentError),
}
