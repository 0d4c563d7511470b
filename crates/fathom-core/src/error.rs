//! Error taxonomy for segment access.
//!
//! Every variant is a synchronous, local contract violation reported to
//! the immediate caller. None of them is retryable: the validator fails
//! fast on the first precondition that does not hold.

use thiserror::Error;

/// Errors raised when a segment operation violates its preconditions.
///
/// The validator checks liveness, confinement, spatial bounds, alignment
/// and read-only state in that order; the first failing check selects the
/// variant.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SegmentError {
    /// The access range does not fit inside `[0, byte_size)`.
    #[error("out of bounds: offset {offset} + length {length} exceeds segment size {byte_size}")]
    OutOfBounds {
        /// Offset of the attempted access, relative to the segment.
        offset: u64,
        /// Number of bytes the access needed.
        length: u64,
        /// Size of the segment that rejected the access.
        byte_size: u64,
    },
    /// The target address is not a multiple of the required alignment,
    /// or the alignment exceeds what a heap segment can guarantee.
    #[error("misaligned access: address {address:#x} is not aligned to {alignment} bytes")]
    Misaligned {
        /// Logical address (segment address + offset) of the access.
        address: u64,
        /// Alignment the access required.
        alignment: u64,
    },
    /// The segment's scope has already been closed.
    #[error("scope is no longer alive")]
    ScopeNotAlive,
    /// A scope was asked to close by a thread that is itself inside an
    /// access on that scope.
    #[error("scope cannot close while the calling thread is accessing it")]
    ScopeInUse,
    /// The calling thread does not own the confined scope.
    #[error("attempted access outside the owning thread")]
    WrongThread,
    /// A write was attempted on a read-only segment.
    #[error("attempted write on a read-only segment")]
    ReadOnly,
    /// The operation needs a different kind of segment.
    #[error("{operation} is not supported on {kind} segments")]
    UnsupportedKind {
        /// Name of the rejected operation.
        operation: &'static str,
        /// Kind of the segment that rejected it.
        kind: &'static str,
    },
    /// A restricted operation was attempted without native access.
    #[error("illegal native access by '{caller}'")]
    IllegalNativeAccess {
        /// Name the caller supplied when requesting access.
        caller: String,
    },
    /// A request was malformed independently of any segment state
    /// (e.g. a non power-of-two alignment or mismatched layout sizes).
    #[error("illegal argument: {reason}")]
    IllegalArgument {
        /// Description of the problem.
        reason: String,
    },
    /// The file-mapping collaborator reported a failure.
    #[error("mapping operation failed: {reason}")]
    MappingFailed {
        /// Description forwarded from the mapping.
        reason: String,
    },
}

impl SegmentError {
    /// Shorthand for [`SegmentError::IllegalArgument`].
    pub fn illegal_argument(reason: impl Into<String>) -> Self {
        Self::IllegalArgument {
            reason: reason.into(),
        }
    }

    /// Whether this error reports a closed scope.
    pub fn is_scope_not_alive(&self) -> bool {
        matches!(self, Self::ScopeNotAlive)
    }

    /// Whether this error reports a spatial bounds violation.
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(self, Self::OutOfBounds { .. })
    }
}
