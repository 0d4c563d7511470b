//! Fathom: bounds-checked, scope-tracked views over heap and native memory.
//!
//! This is the top-level facade crate that re-exports the public API from
//! the Fathom sub-crates. For most users, adding `fathom` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use fathom::prelude::*;
//!
//! let arena = Arena::of_confined();
//! let seg = arena.allocate(16, 8).unwrap();
//! seg.set(&LONG, 0, 42).unwrap();
//! assert_eq!(seg.get(&LONG, 0).unwrap(), 42);
//!
//! // Slices share the arena's lifetime.
//! let tail = seg.as_slice(8).unwrap();
//! tail.fill(0xFF).unwrap();
//! assert_eq!(seg.get(&U8, 15).unwrap(), 0xFF);
//!
//! // A heap array can be viewed the same way, but a byte array cannot
//! // guarantee 4-byte alignment.
//! let bytes = Segment::of_vec(vec![0u8; 10]);
//! assert!(bytes.get(&INT, 0).is_err());
//! assert_eq!(bytes.get(&INT_UNALIGNED, 0).unwrap(), 0);
//!
//! arena.close().unwrap();
//! assert_eq!(seg.get(&LONG, 0), Err(SegmentError::ScopeNotAlive));
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`core`] | `fathom-core` | Errors, scope ids, layouts, the native access token |
//! | [`arena`] | `fathom-arena` | Segments, scopes, arenas, allocators, bulk operations |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Segments, scopes, arenas and allocators (`fathom-arena`).
///
/// Bulk operations that take two segments live at the module root:
/// [`arena::copy`], [`arena::copy_elements`] and [`arena::mismatch_range`].
pub use fathom_arena as arena;

/// Errors, identifiers and layouts (`fathom-core`).
///
/// Contains [`core::SegmentError`], the [`core::ValueLayout`] family and
/// [`core::NativeAccess`].
pub use fathom_core as core;

/// Common imports for typical Fathom usage.
///
/// ```rust
/// use fathom::prelude::*;
/// ```
///
/// This imports segments, arenas, the allocator trait, errors and the
/// predefined layout constants.
pub mod prelude {
    // Segments and arenas
    pub use fathom_arena::{
        copy, mismatch_range, AccessMode, Arena, ArenaConfig, Scope, ScopeKind, Segment,
        SegmentAllocator, SegmentKind,
    };

    // Errors
    pub use fathom_arena::ArenaError;
    pub use fathom_core::SegmentError;

    // Layouts
    pub use fathom_core::{
        AddressLayout, ByteOrder, Layout, MemoryLayout, ValueLayout, ADDRESS, BOOL, BYTE, CHAR,
        DOUBLE, FLOAT, INT, INT_UNALIGNED, LONG, LONG_UNALIGNED, SHORT, U8,
    };
}
