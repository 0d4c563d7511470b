//! Segment allocators.
//!
//! [`SegmentAllocator`] is the common interface of everything that hands
//! out fresh segments: arenas, plus two allocators that carve segments
//! out of an existing one.
//!
//! - [`SlicingAllocator`] is a bump allocator: each request is served
//!   from the first suitably aligned offset after the previous one, and
//!   [`reset`](SlicingAllocator::reset) rewinds the cursor.
//! - [`PrefixAllocator`] always returns a prefix of its segment, so every
//!   allocation overwrites the previous one.

use std::cell::Cell;

use fathom_core::{Carrier, Layout, MemoryLayout, SegmentError, ValueLayout, U8};

use crate::error::ArenaError;
use crate::segment::Segment;

/// Something that can produce segments on request.
pub trait SegmentAllocator {
    /// Allocate `byte_size` bytes aligned to `byte_alignment`.
    fn allocate(&self, byte_size: u64, byte_alignment: u64) -> Result<Segment, ArenaError>;

    /// Allocate a segment shaped like `layout`.
    fn allocate_layout(&self, layout: &impl Layout) -> Result<Segment, ArenaError>
    where
        Self: Sized,
    {
        self.allocate(layout.byte_size(), layout.byte_alignment())
    }

    /// Allocate room for `count` consecutive `element`s.
    fn allocate_array(&self, element: &impl Layout, count: u64) -> Result<Segment, ArenaError>
    where
        Self: Sized,
    {
        self.allocate_layout(&MemoryLayout::sequence(count, element)?)
    }

    /// Allocate a single value and initialize it.
    fn allocate_value<C: Carrier>(
        &self,
        layout: &ValueLayout<C>,
        value: C,
    ) -> Result<Segment, ArenaError>
    where
        Self: Sized,
    {
        let segment = self.allocate_layout(layout)?;
        segment.set(layout, 0, value)?;
        Ok(segment)
    }

    /// Allocate an array initialized from `values`.
    fn allocate_from<C: Carrier>(
        &self,
        layout: &ValueLayout<C>,
        values: &[C],
    ) -> Result<Segment, ArenaError>
    where
        Self: Sized,
    {
        let segment = self.allocate_array(layout, values.len() as u64)?;
        segment.copy_from_slice(values, layout, 0)?;
        Ok(segment)
    }

    /// Allocate a NUL-terminated UTF-8 copy of `value`.
    fn allocate_utf8(&self, value: &str) -> Result<Segment, ArenaError>
    where
        Self: Sized,
    {
        let segment = self.allocate(value.len() as u64 + 1, 1)?;
        segment.copy_from_slice(value.as_bytes(), &U8, 0)?;
        segment.set(&U8, value.len() as u64, 0)?;
        Ok(segment)
    }
}

/// Bump allocation over a fixed segment.
///
/// Not thread-safe: the cursor lives in a [`Cell`].
#[derive(Debug)]
pub struct SlicingAllocator {
    segment: Segment,
    cursor: Cell<u64>,
}

impl SlicingAllocator {
    /// Serve allocations from `segment`.
    pub fn new(segment: Segment) -> Self {
        Self {
            segment,
            cursor: Cell::new(0),
        }
    }

    /// Bytes consumed so far, including alignment padding.
    pub fn used(&self) -> u64 {
        self.cursor.get()
    }

    /// Bytes left after the cursor.
    pub fn remaining(&self) -> u64 {
        self.segment.byte_size() - self.cursor.get()
    }

    /// Rewind to the start. Previously returned segments stay valid and
    /// will alias later allocations.
    pub fn reset(&self) {
        self.cursor.set(0);
    }
}

impl SegmentAllocator for SlicingAllocator {
    fn allocate(&self, byte_size: u64, byte_alignment: u64) -> Result<Segment, ArenaError> {
        if !byte_alignment.is_power_of_two() {
            return Err(ArenaError::InvalidAlignment {
                alignment: byte_alignment,
            });
        }
        let base = self.segment.address();
        let overflow = || SegmentError::OutOfBounds {
            offset: self.cursor.get(),
            length: byte_size,
            byte_size: self.segment.byte_size(),
        };
        let unaligned = base.checked_add(self.cursor.get()).ok_or_else(overflow)?;
        let aligned = unaligned
            .checked_add(byte_alignment - 1)
            .map(|v| v & !(byte_alignment - 1))
            .ok_or_else(overflow)?;
        let start = aligned - base;
        let slice = self.segment.as_slice_aligned(start, byte_size, byte_alignment)?;
        self.cursor.set(start + byte_size);
        Ok(slice)
    }
}

/// Hands out prefixes of one segment.
#[derive(Debug, Clone)]
pub struct PrefixAllocator {
    segment: Segment,
}

impl PrefixAllocator {
    /// Serve allocations from the start of `segment`.
    pub fn new(segment: Segment) -> Self {
        Self { segment }
    }
}

impl SegmentAllocator for PrefixAllocator {
    fn allocate(&self, byte_size: u64, byte_alignment: u64) -> Result<Segment, ArenaError> {
        if !byte_alignment.is_power_of_two() {
            return Err(ArenaError::InvalidAlignment {
                alignment: byte_alignment,
            });
        }
        Ok(self.segment.as_slice_aligned(0, byte_size, byte_alignment)?)
    }
}
