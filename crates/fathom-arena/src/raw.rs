//! Low-level primitives for segment memory operations.
//!
//! This is the only module (besides `native.rs`, which only declares
//! `unsafe fn`s) that dereferences raw pointers, and it only does so
//! through relaxed byte-wide atomics. Everything exported is
//! crate-private and safe to call: a [`RawSpan`] is only ever built by
//! the access validator in `access.rs`, after it has proven that the
//! range lies inside a live segment and while it holds a scope guard
//! that keeps the backing storage from being released.

#![allow(unsafe_code)]

use std::alloc::{self, Layout as AllocLayout};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::ArenaError;

// ── Owned native blocks ─────────────────────────────────────────

/// An aligned block obtained from the system allocator.
///
/// Freed on drop. Zero-sized blocks never touch the allocator and report
/// an address equal to their alignment.
pub(crate) struct RawBlock {
    ptr: NonNull<u8>,
    layout: Option<AllocLayout>,
    byte_size: u64,
}

// SAFETY: a RawBlock exclusively owns its allocation; the pointer is not
// tied to the thread that allocated it.
unsafe impl Send for RawBlock {}
// SAFETY: RawBlock exposes no interior mutability; concurrent reads of
// `address()` are trivially safe.
unsafe impl Sync for RawBlock {}

impl RawBlock {
    /// Allocate `byte_size` bytes aligned to `alignment` (a power of two).
    pub(crate) fn allocate(byte_size: u64, alignment: u64, zeroed: bool) -> Result<Self, ArenaError> {
        let failed = || ArenaError::AllocationFailed {
            byte_size,
            alignment,
        };
        let size = usize::try_from(byte_size).map_err(|_| failed())?;
        let align = usize::try_from(alignment).map_err(|_| failed())?;
        let layout = AllocLayout::from_size_align(size, align)
            .map_err(|_| ArenaError::InvalidAlignment { alignment })?;

        if size == 0 {
            // Dangling but aligned: `align` is a non-zero power of two.
            let ptr = NonNull::new(align as *mut u8).ok_or_else(failed)?;
            return Ok(Self {
                ptr,
                layout: None,
                byte_size,
            });
        }

        // SAFETY: `layout` has a non-zero size.
        let raw = unsafe {
            if zeroed {
                alloc::alloc_zeroed(layout)
            } else {
                alloc::alloc(layout)
            }
        };
        let ptr = NonNull::new(raw).ok_or_else(failed)?;
        Ok(Self {
            ptr,
            layout: Some(layout),
            byte_size,
        })
    }

    /// Address of the first byte.
    pub(crate) fn address(&self) -> u64 {
        self.ptr.as_ptr() as usize as u64
    }

    /// Size requested at allocation time.
    pub(crate) fn byte_size(&self) -> u64 {
        self.byte_size
    }
}

impl Drop for RawBlock {
    fn drop(&mut self) {
        if let Some(layout) = self.layout {
            // SAFETY: `ptr` was returned by `alloc`/`alloc_zeroed` with
            // exactly this layout and has not been freed.
            unsafe { alloc::dealloc(self.ptr.as_ptr(), layout) };
        }
    }
}

// ── Heap arrays ─────────────────────────────────────────────────

/// Type-erased ownership of a `Box<[T]>` for plain-old-data `T`.
///
/// The element type is forgotten after construction; only the pointer,
/// the element count and a monomorphized release function are kept.
pub(crate) struct HeapBlock {
    ptr: NonNull<u8>,
    len: usize,
    release: unsafe fn(NonNull<u8>, usize),
}

// SAFETY: HeapBlock only admits element types that are themselves Send
// and Sync (enforced by `from_vec`'s bounds), and owns the allocation.
unsafe impl Send for HeapBlock {}
// SAFETY: see above. Mutation goes through byte-wide atomic stores on
// validated spans, never through references derived from `&self`.
unsafe impl Sync for HeapBlock {}

impl HeapBlock {
    /// Take ownership of `data`'s buffer.
    ///
    /// `T` must accept every bit pattern (plain integers and floats);
    /// the caller in `heap.rs` restricts it through a sealed trait.
    pub(crate) fn from_vec<T: Copy + Send + Sync + 'static>(data: Vec<T>) -> Self {
        let boxed: Box<[T]> = data.into_boxed_slice();
        let len = boxed.len();
        let raw = Box::into_raw(boxed) as *mut T;
        // Box::into_raw never returns null, even for empty slices.
        let ptr = NonNull::new(raw as *mut u8).unwrap_or(NonNull::dangling());
        Self {
            ptr,
            len,
            release: release_boxed_slice::<T>,
        }
    }

    /// Pointer to the byte at `offset`. Not dereferenced here.
    pub(crate) fn ptr_at(&self, offset: u64) -> *mut u8 {
        self.ptr.as_ptr().wrapping_add(offset as usize)
    }
}

impl Drop for HeapBlock {
    fn drop(&mut self) {
        // SAFETY: `release` is the instantiation matching the element type
        // this block was built from, and runs exactly once.
        unsafe { (self.release)(self.ptr, self.len) };
    }
}

/// Rebuild and drop the `Box<[T]>` leaked by [`HeapBlock::from_vec`].
///
/// # Safety
///
/// `ptr`/`len` must come from `Box::into_raw` on a `Box<[T]>` and must not
/// have been released before.
unsafe fn release_boxed_slice<T>(ptr: NonNull<u8>, len: usize) {
    let slice = ptr::slice_from_raw_parts_mut(ptr.as_ptr() as *mut T, len);
    // SAFETY: guaranteed by the caller.
    drop(unsafe { Box::from_raw(slice) });
}

// ── Validated spans ─────────────────────────────────────────────

/// Relaxed load of one byte.
///
/// # Safety
///
/// `ptr` must be valid for reads.
unsafe fn load_byte(ptr: *mut u8) -> u8 {
    // SAFETY: guaranteed by the caller; a `u8` pointer is always
    // sufficiently aligned for `AtomicU8`.
    unsafe { AtomicU8::from_ptr(ptr) }.load(Ordering::Relaxed)
}

/// Relaxed store of one byte.
///
/// # Safety
///
/// `ptr` must be valid for writes.
unsafe fn store_byte(ptr: *mut u8, value: u8) {
    // SAFETY: as in `load_byte`.
    unsafe { AtomicU8::from_ptr(ptr) }.store(value, Ordering::Relaxed)
}

/// A byte range that the access validator proved valid.
///
/// Only `access.rs` constructs spans, and only while holding the scope
/// guard that keeps the range alive. Every method assumes that contract
/// and performs the raw operation without further checks.
///
/// Segment memory can be reached from several threads at once (heap and
/// shared segments are `Sync`), so every byte is moved with a relaxed
/// atomic access. Racing accesses may observe torn multi-byte values but
/// never a data race. No method ever forms a Rust slice over the span:
/// a reinterpreted span may be far longer than the memory actually
/// mapped behind it.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RawSpan {
    ptr: *mut u8,
    len: usize,
}

impl RawSpan {
    /// Wrap a validated range. Called from the validator only.
    pub(crate) fn new(ptr: *mut u8, len: usize) -> Self {
        Self { ptr, len }
    }

    /// Length in bytes.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    fn at(&self, i: usize) -> *mut u8 {
        self.ptr.wrapping_add(i)
    }

    /// Copy the span into `out[..len]`.
    pub(crate) fn read_into(&self, out: &mut [u8]) {
        let n = self.len.min(out.len());
        for (i, slot) in out[..n].iter_mut().enumerate() {
            // SAFETY: `i < len` and the span is valid for reads.
            *slot = unsafe { load_byte(self.at(i)) };
        }
    }

    /// Copy `src[..len]` into the span.
    pub(crate) fn write_from(&self, src: &[u8]) {
        let n = self.len.min(src.len());
        for (i, &byte) in src[..n].iter().enumerate() {
            // SAFETY: `i < len`; the validator only hands out writable
            // spans for Write mode.
            unsafe { store_byte(self.at(i), byte) };
        }
    }

    /// Set every byte of the span to `value`.
    pub(crate) fn fill(&self, value: u8) {
        for i in 0..self.len {
            // SAFETY: the span is valid and writable for `len` bytes.
            unsafe { store_byte(self.at(i), value) };
        }
    }

    /// Copy this span onto `dst` as if through a temporary buffer.
    pub(crate) fn copy_to(&self, dst: RawSpan) {
        let n = self.len.min(dst.len);
        if n == 0 || self.ptr == dst.ptr {
            return;
        }
        // Walk away from the overlap so no source byte is overwritten
        // before it is read.
        if (dst.ptr as usize) < (self.ptr as usize) {
            for i in 0..n {
                // SAFETY: both spans are valid for `n` bytes.
                unsafe { store_byte(dst.at(i), load_byte(self.at(i))) };
            }
        } else {
            for i in (0..n).rev() {
                // SAFETY: as above.
                unsafe { store_byte(dst.at(i), load_byte(self.at(i))) };
            }
        }
    }

    /// Copy onto `dst`, reversing the bytes of every `element_size`-byte
    /// element.
    pub(crate) fn copy_swapped_to(&self, dst: RawSpan, element_size: usize) {
        let n = self.len.min(dst.len);
        if n == 0 || element_size == 0 {
            return;
        }
        let mut buf = vec![0u8; n];
        self.read_into(&mut buf);
        for element in buf.chunks_exact_mut(element_size) {
            element.reverse();
        }
        dst.write_from(&buf);
    }

    /// Index of the first byte at which the spans differ, comparing
    /// `min(self.len, other.len)` bytes.
    pub(crate) fn first_difference(&self, other: RawSpan) -> Option<usize> {
        let n = self.len.min(other.len);
        // SAFETY: both spans are valid for reads of `n` bytes; the scan
        // stops at the first difference.
        (0..n).find(|&i| unsafe { load_byte(self.at(i)) != load_byte(other.at(i)) })
    }

    /// Index of the first occurrence of `byte`. Bytes after it are never
    /// touched.
    pub(crate) fn find_byte(&self, byte: u8) -> Option<usize> {
        // SAFETY: the span is valid for reads of `len` bytes; the scan
        // stops at the first match.
        (0..self.len).find(|&i| unsafe { load_byte(self.at(i)) } == byte)
    }
}

/// Pointer for a native address. Not dereferenced here.
pub(crate) fn address_ptr(address: u64) -> *mut u8 {
    address as usize as *mut u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span_of(buf: &mut [u8]) -> RawSpan {
        RawSpan::new(buf.as_mut_ptr(), buf.len())
    }

    #[test]
    fn blocks_are_aligned_and_zeroed() {
        let block = RawBlock::allocate(64, 32, true).unwrap();
        assert_eq!(block.address() % 32, 0);
        assert_eq!(block.byte_size(), 64);
        let mut out = [0xFFu8; 64];
        RawSpan::new(address_ptr(block.address()), 64).read_into(&mut out);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn zero_sized_block_reports_alignment() {
        let block = RawBlock::allocate(0, 16, true).unwrap();
        assert_eq!(block.address(), 16);
    }

    #[test]
    fn bad_alignment_is_rejected() {
        assert!(matches!(
            RawBlock::allocate(8, 3, true),
            Err(ArenaError::InvalidAlignment { alignment: 3 })
        ));
    }

    #[test]
    fn overlapping_copy_behaves_like_memmove() {
        let mut buf = [1u8, 2, 3, 4, 5, 6];
        let base = buf.as_mut_ptr();
        let src = RawSpan::new(base, 4);
        let dst = RawSpan::new(base.wrapping_add(2), 4);
        src.copy_to(dst);
        assert_eq!(buf, [1, 2, 1, 2, 3, 4]);
    }

    #[test]
    fn swapped_copy_reverses_each_element() {
        let mut src = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let mut dst = [0u8; 8];
        span_of(&mut src).copy_swapped_to(span_of(&mut dst), 4);
        assert_eq!(dst, [4, 3, 2, 1, 8, 7, 6, 5]);
    }

    #[test]
    fn first_difference_and_find() {
        let mut a = [1u8, 2, 3, 0];
        let mut b = [1u8, 2, 9, 0];
        assert_eq!(span_of(&mut a).first_difference(span_of(&mut b)), Some(2));
        assert_eq!(span_of(&mut a).first_difference(span_of(&mut a.clone())), None);
        assert_eq!(span_of(&mut a).find_byte(0), Some(3));
    }

    #[test]
    fn find_byte_stops_at_first_match_in_oversized_span() {
        // The span claims far more bytes than exist; only the prefix up to
        // the NUL may be read.
        let mut buf = *b"hello\0";
        let span = RawSpan::new(buf.as_mut_ptr(), usize::MAX);
        assert_eq!(span.find_byte(0), Some(5));
        let mut other = *b"help\0\0";
        let shorter = RawSpan::new(other.as_mut_ptr(), usize::MAX);
        assert_eq!(span.first_difference(shorter), Some(3));
    }

    #[test]
    fn overlapping_copy_towards_lower_addresses() {
        let mut buf = [1u8, 2, 3, 4, 5, 6];
        let base = buf.as_mut_ptr();
        RawSpan::new(base.wrapping_add(2), 4).copy_to(RawSpan::new(base, 4));
        assert_eq!(buf, [3, 4, 5, 6, 5, 6]);
    }

    #[test]
    fn heap_block_round_trips_through_raw_pointer() {
        let block = HeapBlock::from_vec(vec![0x0102_0304u32, 0]);
        let span = RawSpan::new(block.ptr_at(4), 4);
        span.write_from(&[9, 9, 9, 9]);
        let mut out = [0u8; 4];
        span.read_into(&mut out);
        assert_eq!(out, [9, 9, 9, 9]);
    }
}
