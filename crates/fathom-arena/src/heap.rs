//! On-heap backing arrays.
//!
//! A heap segment addresses a Rust-owned array. The array is held in an
//! `Arc<HeapArray>` by the segment kind and cloned into every slice, so
//! it outlives all derived segments without any scope bookkeeping.

use std::fmt;
use std::sync::Arc;

use crate::raw::HeapBlock;

mod sealed {
    pub trait Sealed {}
}

/// Element types that can back a heap segment.
///
/// Sealed: every implementor accepts all bit patterns, so arbitrary
/// writes through a segment can never produce an invalid value. `bool`
/// is deliberately absent.
pub trait HeapElement: sealed::Sealed + Copy + Send + Sync + 'static {
    /// Element width in bytes; also the segment's maximum alignment.
    const WIDTH: u64;
    /// Short name used in diagnostics.
    const NAME: &'static str;
}

macro_rules! impl_heap_element {
    ($($ty:ty => $name:literal),* $(,)?) => {$(
        impl sealed::Sealed for $ty {}
        impl HeapElement for $ty {
            const WIDTH: u64 = std::mem::size_of::<$ty>() as u64;
            const NAME: &'static str = $name;
        }
    )*};
}

impl_heap_element!(
    i8 => "byte",
    u8 => "ubyte",
    u16 => "char",
    i16 => "short",
    i32 => "int",
    u32 => "uint",
    f32 => "float",
    i64 => "long",
    u64 => "ulong",
    f64 => "double",
);

/// A type-erased, reference-counted array backing heap segments.
pub struct HeapArray {
    block: HeapBlock,
    len: usize,
    element_width: u64,
    element_name: &'static str,
}

impl HeapArray {
    /// Take ownership of `data`.
    pub fn new<T: HeapElement>(data: Vec<T>) -> Arc<Self> {
        let len = data.len();
        Arc::new(Self {
            block: HeapBlock::from_vec(data),
            len,
            element_width: T::WIDTH,
            element_name: T::NAME,
        })
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Width of one element in bytes.
    pub fn element_width(&self) -> u64 {
        self.element_width
    }

    /// Name of the element type.
    pub fn element_name(&self) -> &'static str {
        self.element_name
    }

    /// Total size in bytes.
    pub fn byte_len(&self) -> u64 {
        self.len as u64 * self.element_width
    }

    pub(crate) fn ptr_at(&self, offset: u64) -> *mut u8 {
        self.block.ptr_at(offset)
    }
}

impl fmt::Debug for HeapArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.element_name, self.len)
    }
}
