//! Scoped, bounds-checked memory segments for Fathom.
//!
//! A [`Segment`] is a view over a contiguous range of memory that knows
//! its own extent and the [`Scope`] whose lifetime bounds it. Every read,
//! write, copy or comparison is validated first, so a segment can never
//! touch bytes outside its range or after its storage has been freed.
//!
//! # Architecture
//!
//! ```text
//! Arena (allocator collaborator)
//! ├── Scope (confined / shared / auto / global lifetime)
//! │   ├── cleanup actions (registered by reinterpretation)
//! │   └── RawBlock[] (aligned native storage, freed on close)
//! └── Segment[] (address, size, kind, read-only, scope)
//!     ├── Heap(Arc<HeapArray>)  – Rust-owned array
//!     ├── Native                – arena or raw-address memory
//!     └── Mapped(Arc<dyn FileMapping>)
//! ```
//!
//! # Unsafe code
//!
//! Pointer dereferences live in `raw.rs` only. `native.rs` declares the
//! `unsafe fn` that mints a [`NativeAccess`] token; everything that can
//! widen a segment beyond memory the crate allocated requires that
//! token.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod access;
pub mod allocator;
pub mod arena;
pub mod bulk;
pub mod config;
pub mod error;
pub mod heap;
pub mod mapping;
pub mod native;
mod raw;
pub mod scope;
pub mod segment;

// Public re-exports for the primary API surface.
pub use access::AccessMode;
pub use allocator::{PrefixAllocator, SegmentAllocator, SlicingAllocator};
pub use arena::Arena;
pub use bulk::{copy, copy_elements, mismatch_range};
pub use config::{ArenaConfig, NativeAccessPolicy};
pub use error::ArenaError;
pub use fathom_core::NativeAccess;
pub use heap::{HeapArray, HeapElement};
pub use mapping::FileMapping;
pub use native::{enable_native_access, native_access_policy, set_native_access_policy, Cleanup};
pub use scope::{Scope, ScopeKind};
pub use segment::{Elements, Segment, SegmentKind};
