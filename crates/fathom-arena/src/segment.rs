//! Segments: bounds-checked views over contiguous memory.
//!
//! A [`Segment`] pairs a spatial extent (logical address + byte size)
//! with a temporal one (its [`Scope`]). Segments are cheap, immutable
//! handles: slicing, read-only views and reinterpretation all return new
//! segments that share the scope and, for heap segments, the backing
//! array.
//!
//! The address of a heap segment is an offset into its backing array;
//! the address of a native or mapped segment is the raw virtual address.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::thread::ThreadId;

use fathom_core::{Layout, SegmentError};

use crate::heap::{HeapArray, HeapElement};
use crate::mapping::FileMapping;
use crate::raw;
use crate::scope::Scope;

/// Maximum alignment reported for the native segment at address zero.
const MAX_ALIGNMENT_AT_ZERO: u64 = 1 << 62;

/// What backs a segment's bytes.
#[derive(Clone)]
pub enum SegmentKind {
    /// A Rust-owned array, kept alive by the segment itself.
    Heap(Arc<HeapArray>),
    /// Off-heap memory from an arena or a raw address.
    Native,
    /// Off-heap memory backed by a file mapping.
    Mapped(Arc<dyn FileMapping>),
}

impl SegmentKind {
    /// Short lower-case name, as used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Heap(_) => "heap",
            Self::Native => "native",
            Self::Mapped(_) => "mapped",
        }
    }
}

impl fmt::Debug for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Heap(array) => f.debug_tuple("Heap").field(array).finish(),
            Self::Native => f.write_str("Native"),
            Self::Mapped(mapping) => f.debug_tuple("Mapped").field(mapping).finish(),
        }
    }
}

/// A contiguous, bounds-checked, scope-tracked region of memory.
#[derive(Clone)]
pub struct Segment {
    address: u64,
    byte_size: u64,
    kind: SegmentKind,
    read_only: bool,
    scope: Scope,
}

// Compile-time assertion: Segment must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Segment>();
};

impl Segment {
    pub(crate) fn from_parts(
        address: u64,
        byte_size: u64,
        kind: SegmentKind,
        read_only: bool,
        scope: Scope,
    ) -> Self {
        Self {
            address,
            byte_size,
            kind,
            read_only,
            scope,
        }
    }

    // ── Construction ────────────────────────────────────────────

    /// Wrap a shared heap array. The segment covers the whole array.
    pub fn of_heap(array: Arc<HeapArray>) -> Self {
        let byte_size = array.byte_len();
        Self::from_parts(0, byte_size, SegmentKind::Heap(array), false, Scope::always_alive())
    }

    /// Wrap an owned vector of plain scalars.
    pub fn of_vec<T: HeapElement>(data: Vec<T>) -> Self {
        Self::of_heap(HeapArray::new(data))
    }

    /// A zero-length native segment carrying `address`.
    ///
    /// Every access through it fails bounds checking until it is
    /// reinterpreted with a [`NativeAccess`](fathom_core::NativeAccess)
    /// token.
    pub fn of_address(address: u64) -> Self {
        Self::from_parts(address, 0, SegmentKind::Native, false, Scope::always_alive())
    }

    /// The zero-length native segment at address zero.
    pub fn null() -> Self {
        Self::of_address(0)
    }

    // ── Properties ──────────────────────────────────────────────

    /// Logical address: an offset into the backing array for heap
    /// segments, the raw address otherwise.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Size in bytes.
    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    /// What backs the segment.
    pub fn kind(&self) -> &SegmentKind {
        &self.kind
    }

    /// The lifetime this segment is bound to.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Whether writes through this segment are rejected.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether the segment is off-heap (native or mapped).
    pub fn is_native(&self) -> bool {
        !matches!(self.kind, SegmentKind::Heap(_))
    }

    /// Whether the segment is backed by a file mapping.
    pub fn is_mapped(&self) -> bool {
        matches!(self.kind, SegmentKind::Mapped(_))
    }

    /// The backing array of a heap segment.
    pub fn heap_base(&self) -> Option<&Arc<HeapArray>> {
        match &self.kind {
            SegmentKind::Heap(array) => Some(array),
            _ => None,
        }
    }

    /// Largest alignment any access through this segment can satisfy.
    ///
    /// For heap segments this is the element width of the backing array;
    /// for off-heap segments it is the largest power of two dividing the
    /// address.
    pub fn max_byte_alignment(&self) -> u64 {
        match &self.kind {
            SegmentKind::Heap(array) => array.element_width(),
            SegmentKind::Native | SegmentKind::Mapped(_) => {
                if self.address == 0 {
                    MAX_ALIGNMENT_AT_ZERO
                } else {
                    1 << self.address.trailing_zeros()
                }
            }
        }
    }

    /// Whether `thread` may access the segment.
    pub fn is_accessible_by(&self, thread: ThreadId) -> bool {
        self.scope.is_accessible_by(thread)
    }

    /// A read-only view of the same memory.
    pub fn as_read_only(&self) -> Segment {
        Self {
            read_only: true,
            ..self.clone()
        }
    }

    // ── Slicing ─────────────────────────────────────────────────

    /// The suffix starting at `offset`.
    ///
    /// # Errors
    ///
    /// [`SegmentError::ScopeNotAlive`] if the scope has closed,
    /// [`SegmentError::OutOfBounds`] if `offset > byte_size`.
    pub fn as_slice(&self, offset: u64) -> Result<Segment, SegmentError> {
        self.scope.check_alive()?;
        let new_size = self.byte_size.checked_sub(offset).ok_or(SegmentError::OutOfBounds {
            offset,
            length: 0,
            byte_size: self.byte_size,
        })?;
        Ok(self.slice_unchecked(offset, new_size))
    }

    /// `new_size` bytes starting at `offset`.
    pub fn as_slice_sized(&self, offset: u64, new_size: u64) -> Result<Segment, SegmentError> {
        self.as_slice_aligned(offset, new_size, 1)
    }

    /// `new_size` bytes starting at `offset`, whose address must be a
    /// multiple of `alignment`.
    ///
    /// # Errors
    ///
    /// In order: [`SegmentError::IllegalArgument`] for a non power-of-two
    /// alignment, [`SegmentError::ScopeNotAlive`],
    /// [`SegmentError::OutOfBounds`], [`SegmentError::Misaligned`].
    pub fn as_slice_aligned(
        &self,
        offset: u64,
        new_size: u64,
        alignment: u64,
    ) -> Result<Segment, SegmentError> {
        if !alignment.is_power_of_two() {
            return Err(SegmentError::illegal_argument(format!(
                "alignment {alignment} is not a power of two"
            )));
        }
        self.scope.check_alive()?;
        self.check_bounds(offset, new_size)?;
        self.check_alignment(offset, alignment)?;
        Ok(self.slice_unchecked(offset, new_size))
    }

    /// A slice shaped like `layout` starting at `offset`.
    pub fn as_slice_layout(&self, offset: u64, layout: &impl Layout) -> Result<Segment, SegmentError> {
        self.as_slice_aligned(offset, layout.byte_size(), layout.byte_alignment())
    }

    pub(crate) fn slice_unchecked(&self, offset: u64, new_size: u64) -> Segment {
        Self {
            address: self.address.wrapping_add(offset),
            byte_size: new_size,
            ..self.clone()
        }
    }

    /// The part of `self` that overlaps `other`, if both view the same
    /// backing memory and their ranges intersect.
    pub fn as_overlapping_slice(&self, other: &Segment) -> Option<Segment> {
        if !self.same_base(other) {
            return None;
        }
        let start = self.address.max(other.address);
        let end = self.end().min(other.end());
        if start >= end {
            return None;
        }
        Some(self.slice_unchecked(start - self.address, end - start))
    }

    /// Offset of `other`'s start relative to `self`'s start, when both view
    /// the same backing memory.
    pub fn segment_offset(&self, other: &Segment) -> Result<i64, SegmentError> {
        if !self.same_base(other) {
            return Err(SegmentError::illegal_argument(
                "segments do not share a backing memory",
            ));
        }
        Ok(other.address.wrapping_sub(self.address) as i64)
    }

    /// Consecutive slices of `layout`'s size covering the whole segment.
    ///
    /// # Errors
    ///
    /// [`SegmentError::IllegalArgument`] if the layout is empty, its
    /// alignment exceeds its size, or the segment size is not a multiple
    /// of the layout size; [`SegmentError::Misaligned`] if the segment
    /// start does not satisfy the layout alignment.
    pub fn elements(&self, layout: &impl Layout) -> Result<Elements, SegmentError> {
        let size = layout.byte_size();
        let alignment = layout.byte_alignment();
        if size == 0 {
            return Err(SegmentError::illegal_argument("element layout has size zero"));
        }
        if alignment > size {
            return Err(SegmentError::illegal_argument(format!(
                "element alignment {alignment} exceeds element size {size}"
            )));
        }
        if self.byte_size % size != 0 {
            return Err(SegmentError::illegal_argument(format!(
                "segment size {} is not a multiple of element size {size}",
                self.byte_size
            )));
        }
        self.check_alignment(0, alignment)?;
        Ok(Elements {
            segment: self.clone(),
            element_size: size,
            next: 0,
        })
    }

    // ── Checks shared with the validator ────────────────────────

    pub(crate) fn check_bounds(&self, offset: u64, length: u64) -> Result<(), SegmentError> {
        match offset.checked_add(length) {
            Some(end) if end <= self.byte_size => Ok(()),
            _ => Err(SegmentError::OutOfBounds {
                offset,
                length,
                byte_size: self.byte_size,
            }),
        }
    }

    /// `alignment` must be a power of two.
    pub(crate) fn check_alignment(&self, offset: u64, alignment: u64) -> Result<(), SegmentError> {
        let address = self.address.wrapping_add(offset);
        let heap_limited = match &self.kind {
            SegmentKind::Heap(array) => alignment > array.element_width(),
            _ => false,
        };
        if heap_limited || address & (alignment - 1) != 0 {
            return Err(SegmentError::Misaligned { address, alignment });
        }
        Ok(())
    }

    /// Pointer to the byte at `offset`. Not dereferenced here.
    pub(crate) fn ptr_at(&self, offset: u64) -> *mut u8 {
        let address = self.address.wrapping_add(offset);
        match &self.kind {
            SegmentKind::Heap(array) => array.ptr_at(address),
            SegmentKind::Native | SegmentKind::Mapped(_) => raw::address_ptr(address),
        }
    }

    fn end(&self) -> u64 {
        self.address.saturating_add(self.byte_size)
    }

    fn base_identity(&self) -> usize {
        match &self.kind {
            SegmentKind::Heap(array) => Arc::as_ptr(array) as usize,
            SegmentKind::Native | SegmentKind::Mapped(_) => 0,
        }
    }

    fn same_base(&self, other: &Segment) -> bool {
        self.is_native() == other.is_native() && self.base_identity() == other.base_identity()
    }
}

/// Equality is identity of the first byte: same backing memory and same
/// address. Size, scope and read-only state are ignored.
impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        self.same_base(other) && self.address == other.address
    }
}

impl Eq for Segment {}

impl Hash for Segment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.is_native().hash(state);
        self.base_identity().hash(state);
        self.address.hash(state);
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("kind", &self.kind)
            .field("address", &format_args!("{:#x}", self.address))
            .field("byte_size", &self.byte_size)
            .field("read_only", &self.read_only)
            .field("scope", &self.scope.id())
            .finish()
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} segment @ {:#x} [{} bytes]",
            self.kind.name(),
            self.address,
            self.byte_size
        )?;
        if self.read_only {
            f.write_str(" (read-only)")?;
        }
        Ok(())
    }
}

/// Iterator returned by [`Segment::elements`].
pub struct Elements {
    segment: Segment,
    element_size: u64,
    next: u64,
}

impl Iterator for Elements {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        if self.next >= self.segment.byte_size {
            return None;
        }
        let slice = self.segment.slice_unchecked(self.next, self.element_size);
        self.next += self.element_size;
        Some(slice)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = ((self.segment.byte_size - self.next) / self.element_size) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Elements {}
