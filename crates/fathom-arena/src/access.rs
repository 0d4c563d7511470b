//! The access validator and typed accessors.
//!
//! Every read or write goes through [`Segment::check_access`]'s checks
//! before any raw primitive runs. They are applied in a fixed order and
//! the first failure wins:
//!
//! 1. scope liveness
//! 2. confinement (owner thread)
//! 3. spatial bounds
//! 4. alignment, including a heap array's element-width limit
//! 5. read-only state, for writes
//!
//! On success the validator hands back a [`RawSpan`] together with the
//! scope guard that keeps the span's storage alive.

use fathom_core::{
    AddressLayout, Carrier, Layout, SegmentError, ValueLayout, ADDRESS_SIZE, U8,
};

use crate::raw::RawSpan;
use crate::scope::{Scope, ScopeGuard};
use crate::segment::{Segment, SegmentKind};

/// Direction of an access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Bytes are only read.
    Read,
    /// Bytes may be modified.
    Write,
}

impl Segment {
    /// Run the full validator without performing an access.
    ///
    /// `alignment` must be a power of two.
    pub fn check_access(
        &self,
        offset: u64,
        length: u64,
        alignment: u64,
        mode: AccessMode,
    ) -> Result<(), SegmentError> {
        self.checked_span(offset, length, alignment, mode).map(drop)
    }

    /// Validate and enter the scope. The span is only valid while the
    /// returned guard lives.
    pub(crate) fn checked_span(
        &self,
        offset: u64,
        length: u64,
        alignment: u64,
        mode: AccessMode,
    ) -> Result<(ScopeGuard<'_>, RawSpan), SegmentError> {
        let guard = self.scope().acquire()?;
        self.check_bounds(offset, length)?;
        self.check_alignment(offset, alignment)?;
        if mode == AccessMode::Write && self.is_read_only() {
            return Err(SegmentError::ReadOnly);
        }
        let len = usize::try_from(length).map_err(|_| SegmentError::OutOfBounds {
            offset,
            length,
            byte_size: self.byte_size(),
        })?;
        Ok((guard, RawSpan::new(self.ptr_at(offset), len)))
    }

    // ── Scalars ─────────────────────────────────────────────────

    /// Read the value described by `layout` at `offset`.
    pub fn get<C: Carrier>(&self, layout: &ValueLayout<C>, offset: u64) -> Result<C, SegmentError> {
        let (_guard, span) =
            self.checked_span(offset, C::SIZE as u64, layout.byte_alignment(), AccessMode::Read)?;
        let mut buf = [0u8; 8];
        span.read_into(&mut buf[..C::SIZE]);
        Ok(C::decode(&buf, layout.order()))
    }

    /// Write `value` as described by `layout` at `offset`.
    pub fn set<C: Carrier>(
        &self,
        layout: &ValueLayout<C>,
        offset: u64,
        value: C,
    ) -> Result<(), SegmentError> {
        let (_guard, span) =
            self.checked_span(offset, C::SIZE as u64, layout.byte_alignment(), AccessMode::Write)?;
        let mut buf = [0u8; 8];
        value.encode(&mut buf, layout.order());
        span.write_from(&buf[..C::SIZE]);
        Ok(())
    }

    /// Read element `index` of an array of `layout`.
    pub fn get_at_index<C: Carrier>(
        &self,
        layout: &ValueLayout<C>,
        index: u64,
    ) -> Result<C, SegmentError> {
        let offset = self.index_offset(layout, index)?;
        self.get(layout, offset)
    }

    /// Write element `index` of an array of `layout`.
    pub fn set_at_index<C: Carrier>(
        &self,
        layout: &ValueLayout<C>,
        index: u64,
        value: C,
    ) -> Result<(), SegmentError> {
        let offset = self.index_offset(layout, index)?;
        self.set(layout, offset, value)
    }

    fn index_offset(&self, layout: &impl Layout, index: u64) -> Result<u64, SegmentError> {
        let size = layout.byte_size();
        if layout.byte_alignment() > size {
            return Err(SegmentError::illegal_argument(format!(
                "element alignment {} exceeds element size {size}",
                layout.byte_alignment()
            )));
        }
        index.checked_mul(size).ok_or(SegmentError::OutOfBounds {
            offset: u64::MAX,
            length: size,
            byte_size: self.byte_size(),
        })
    }

    // ── Addresses ───────────────────────────────────────────────

    /// Read an address and wrap it as a native segment.
    ///
    /// The result has zero length unless `layout` declares a target
    /// layout, in which case it is sized to the target and its address
    /// must satisfy the target's alignment. Either way the result lives
    /// in a fresh always-alive scope.
    pub fn get_address(&self, layout: &AddressLayout, offset: u64) -> Result<Segment, SegmentError> {
        let (_guard, span) =
            self.checked_span(offset, ADDRESS_SIZE, layout.byte_alignment(), AccessMode::Read)?;
        let mut buf = [0u8; 8];
        span.read_into(&mut buf[..ADDRESS_SIZE as usize]);
        let address = decode_address(&buf, layout);

        let byte_size = match layout.target_layout() {
            Some(target) => {
                if address & (target.byte_alignment() - 1) != 0 {
                    return Err(SegmentError::Misaligned {
                        address,
                        alignment: target.byte_alignment(),
                    });
                }
                target.byte_size()
            }
            None => 0,
        };
        Ok(Segment::from_parts(
            address,
            byte_size,
            SegmentKind::Native,
            false,
            Scope::always_alive(),
        ))
    }

    /// Store the address of the native segment `value` at `offset`.
    ///
    /// # Errors
    ///
    /// [`SegmentError::IllegalArgument`] if `value` is a heap segment,
    /// whose address is not a machine address; otherwise as for any
    /// write.
    pub fn set_address(
        &self,
        layout: &AddressLayout,
        offset: u64,
        value: &Segment,
    ) -> Result<(), SegmentError> {
        if !value.is_native() {
            return Err(SegmentError::illegal_argument(
                "heap segments have no machine address",
            ));
        }
        let (_guard, span) =
            self.checked_span(offset, ADDRESS_SIZE, layout.byte_alignment(), AccessMode::Write)?;
        let mut buf = [0u8; 8];
        encode_address(value.address(), &mut buf, layout);
        span.write_from(&buf[..ADDRESS_SIZE as usize]);
        Ok(())
    }

    /// Read address element `index`.
    pub fn get_address_at_index(
        &self,
        layout: &AddressLayout,
        index: u64,
    ) -> Result<Segment, SegmentError> {
        let offset = self.index_offset(layout, index)?;
        self.get_address(layout, offset)
    }

    /// Write address element `index`.
    pub fn set_address_at_index(
        &self,
        layout: &AddressLayout,
        index: u64,
        value: &Segment,
    ) -> Result<(), SegmentError> {
        let offset = self.index_offset(layout, index)?;
        self.set_address(layout, offset, value)
    }

    // ── Whole-segment reads ─────────────────────────────────────

    /// Copy the whole segment out as a vector of `layout` values.
    ///
    /// # Errors
    ///
    /// [`SegmentError::IllegalArgument`] if the size is not a multiple of
    /// the element size; otherwise as for a read of the whole segment.
    pub fn to_vec<C: Carrier>(&self, layout: &ValueLayout<C>) -> Result<Vec<C>, SegmentError> {
        let size = C::SIZE as u64;
        if self.byte_size() % size != 0 {
            return Err(SegmentError::illegal_argument(format!(
                "segment size {} is not a multiple of {} ({size} bytes)",
                self.byte_size(),
                C::NAME
            )));
        }
        let (_guard, span) =
            self.checked_span(0, self.byte_size(), layout.byte_alignment(), AccessMode::Read)?;
        let mut bytes = vec![0u8; span.len()];
        span.read_into(&mut bytes);
        Ok(bytes
            .chunks_exact(C::SIZE)
            .map(|chunk| C::decode(chunk, layout.order()))
            .collect())
    }

    /// Read a NUL-terminated UTF-8 string starting at `offset`.
    ///
    /// Invalid sequences are replaced with U+FFFD.
    ///
    /// # Errors
    ///
    /// [`SegmentError::OutOfBounds`] if no NUL byte occurs before the end
    /// of the segment.
    pub fn get_utf8_string(&self, offset: u64) -> Result<String, SegmentError> {
        let remaining = self.byte_size().checked_sub(offset).ok_or(SegmentError::OutOfBounds {
            offset,
            length: 1,
            byte_size: self.byte_size(),
        })?;
        let (_guard, span) = self.checked_span(offset, remaining, 1, AccessMode::Read)?;
        let Some(len) = span.find_byte(0) else {
            return Err(SegmentError::OutOfBounds {
                offset,
                length: remaining + 1,
                byte_size: self.byte_size(),
            });
        };
        let mut bytes = vec![0u8; len];
        span.read_into(&mut bytes);
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Write `value` followed by a NUL byte at `offset`.
    pub fn set_utf8_string(&self, offset: u64, value: &str) -> Result<(), SegmentError> {
        let len = value.len() as u64;
        let target = self.as_slice_sized(offset, len + 1)?;
        target.copy_from_slice(value.as_bytes(), &U8, 0)?;
        target.set(&U8, len, 0)
    }
}

fn decode_address(buf: &[u8], layout: &AddressLayout) -> u64 {
    if ADDRESS_SIZE == 8 {
        u64::decode(buf, layout.order())
    } else {
        u64::from(u32::decode(buf, layout.order()))
    }
}

fn encode_address(address: u64, buf: &mut [u8], layout: &AddressLayout) {
    if ADDRESS_SIZE == 8 {
        address.encode(buf, layout.order());
    } else {
        (address as u32).encode(buf, layout.order());
    }
}
