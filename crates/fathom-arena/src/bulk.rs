//! Bulk copy, fill and mismatch.
//!
//! Each endpoint is validated independently (source for reads,
//! destination for writes), and both scope guards are held for the
//! duration of the raw operation. Copies behave as if the source were
//! first copied to a temporary buffer, so overlapping ranges within the
//! same backing memory are safe.

use fathom_core::{Carrier, Layout, SegmentError, ValueLayout};

use crate::access::AccessMode;
use crate::segment::Segment;

/// Copy `bytes` bytes from `src` at `src_offset` to `dst` at `dst_offset`.
///
/// # Errors
///
/// The first validator failure on `src` (as a read), then on `dst` (as a
/// write).
pub fn copy(
    src: &Segment,
    src_offset: u64,
    dst: &Segment,
    dst_offset: u64,
    bytes: u64,
) -> Result<(), SegmentError> {
    let (_src_guard, from) = src.checked_span(src_offset, bytes, 1, AccessMode::Read)?;
    let (_dst_guard, to) = dst.checked_span(dst_offset, bytes, 1, AccessMode::Write)?;
    from.copy_to(to);
    Ok(())
}

/// Copy `count` elements, converting byte order when the layouts differ.
///
/// # Errors
///
/// [`SegmentError::IllegalArgument`] if the element sizes differ or a
/// layout's alignment exceeds its size; otherwise validator failures on
/// either endpoint, with the layouts' alignments applied.
pub fn copy_elements<S: Carrier, D: Carrier>(
    src: &Segment,
    src_layout: &ValueLayout<S>,
    src_offset: u64,
    dst: &Segment,
    dst_layout: &ValueLayout<D>,
    dst_offset: u64,
    count: u64,
) -> Result<(), SegmentError> {
    let size = src_layout.byte_size();
    if size != dst_layout.byte_size() {
        return Err(SegmentError::illegal_argument(format!(
            "element sizes differ: {size} vs {}",
            dst_layout.byte_size()
        )));
    }
    for layout in [
        (src_layout.byte_alignment(), "source"),
        (dst_layout.byte_alignment(), "destination"),
    ] {
        if layout.0 > size {
            return Err(SegmentError::illegal_argument(format!(
                "{} element alignment {} exceeds element size {size}",
                layout.1, layout.0
            )));
        }
    }
    let bytes = count.checked_mul(size).ok_or(SegmentError::OutOfBounds {
        offset: src_offset,
        length: u64::MAX,
        byte_size: src.byte_size(),
    })?;

    let (_src_guard, from) =
        src.checked_span(src_offset, bytes, src_layout.byte_alignment(), AccessMode::Read)?;
    let (_dst_guard, to) =
        dst.checked_span(dst_offset, bytes, dst_layout.byte_alignment(), AccessMode::Write)?;
    if size == 1 || src_layout.order() == dst_layout.order() {
        from.copy_to(to);
    } else {
        from.copy_swapped_to(to, size as usize);
    }
    Ok(())
}

/// Offset of the first differing byte between two ranges.
///
/// Returns `None` when the ranges have equal length and equal contents,
/// and the length of the shorter range when it is a prefix of the longer
/// one.
///
/// # Errors
///
/// [`SegmentError::OutOfBounds`] if either range is inverted or exceeds its
/// segment; otherwise validator failures on either endpoint.
pub fn mismatch_range(
    src: &Segment,
    src_from: u64,
    src_to: u64,
    dst: &Segment,
    dst_from: u64,
    dst_to: u64,
) -> Result<Option<u64>, SegmentError> {
    let range_len = |seg: &Segment, from: u64, to: u64| {
        to.checked_sub(from).ok_or(SegmentError::OutOfBounds {
            offset: from,
            length: 0,
            byte_size: seg.byte_size(),
        })
    };
    let src_len = range_len(src, src_from, src_to)?;
    let dst_len = range_len(dst, dst_from, dst_to)?;

    let (_src_guard, a) = src.checked_span(src_from, src_len, 1, AccessMode::Read)?;
    let (_dst_guard, b) = dst.checked_span(dst_from, dst_len, 1, AccessMode::Read)?;
    if let Some(i) = a.first_difference(b) {
        return Ok(Some(i as u64));
    }
    if src_len == dst_len {
        Ok(None)
    } else {
        Ok(Some(src_len.min(dst_len)))
    }
}

impl Segment {
    /// Set every byte of the segment to `value`.
    pub fn fill(&self, value: u8) -> Result<(), SegmentError> {
        let (_guard, span) = self.checked_span(0, self.byte_size(), 1, AccessMode::Write)?;
        span.fill(value);
        Ok(())
    }

    /// Copy all of `src` to the start of this segment.
    pub fn copy_from(&self, src: &Segment) -> Result<(), SegmentError> {
        copy(src, 0, self, 0, src.byte_size())
    }

    /// First differing offset between this segment and `other`; see
    /// [`mismatch_range`].
    pub fn mismatch(&self, other: &Segment) -> Result<Option<u64>, SegmentError> {
        mismatch_range(self, 0, self.byte_size(), other, 0, other.byte_size())
    }

    /// Decode `dst.len()` elements starting at `offset` into `dst`.
    pub fn copy_to_slice<C: Carrier>(
        &self,
        layout: &ValueLayout<C>,
        offset: u64,
        dst: &mut [C],
    ) -> Result<(), SegmentError> {
        let bytes = slice_bytes::<C>(dst.len(), offset, self)?;
        let (_guard, span) =
            self.checked_span(offset, bytes, layout.byte_alignment(), AccessMode::Read)?;
        let mut buf = vec![0u8; span.len()];
        span.read_into(&mut buf);
        for (slot, chunk) in dst.iter_mut().zip(buf.chunks_exact(C::SIZE)) {
            *slot = C::decode(chunk, layout.order());
        }
        Ok(())
    }

    /// Encode `src` into the segment starting at `offset`.
    pub fn copy_from_slice<C: Carrier>(
        &self,
        src: &[C],
        layout: &ValueLayout<C>,
        offset: u64,
    ) -> Result<(), SegmentError> {
        let bytes = slice_bytes::<C>(src.len(), offset, self)?;
        let (_guard, span) =
            self.checked_span(offset, bytes, layout.byte_alignment(), AccessMode::Write)?;
        let mut buf = vec![0u8; span.len()];
        for (value, chunk) in src.iter().zip(buf.chunks_exact_mut(C::SIZE)) {
            value.encode(chunk, layout.order());
        }
        span.write_from(&buf);
        Ok(())
    }
}

fn slice_bytes<C: Carrier>(count: usize, offset: u64, seg: &Segment) -> Result<u64, SegmentError> {
    (count as u64)
        .checked_mul(C::SIZE as u64)
        .ok_or(SegmentError::OutOfBounds {
            offset,
            length: u64::MAX,
            byte_size: seg.byte_size(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fathom_core::{ByteOrder, INT, INT_UNALIGNED, SHORT, U8};
    use proptest::prelude::*;

    fn bytes(data: &[u8]) -> Segment {
        Segment::of_vec(data.to_vec())
    }

    #[test]
    fn copy_between_segments() {
        let src = bytes(&[1, 2, 3, 4]);
        let dst = bytes(&[0; 6]);
        copy(&src, 1, &dst, 2, 3).unwrap();
        assert_eq!(dst.to_vec(&U8).unwrap(), vec![0, 0, 2, 3, 4, 0]);
    }

    #[test]
    fn overlapping_copy_is_safe_in_both_directions() {
        let seg = bytes(&[1, 2, 3, 4, 5, 6]);
        copy(&seg, 0, &seg, 2, 4).unwrap();
        assert_eq!(seg.to_vec(&U8).unwrap(), vec![1, 2, 1, 2, 3, 4]);

        let seg = bytes(&[1, 2, 3, 4, 5, 6]);
        copy(&seg, 2, &seg, 0, 4).unwrap();
        assert_eq!(seg.to_vec(&U8).unwrap(), vec![3, 4, 5, 6, 5, 6]);
    }

    #[test]
    fn copy_validates_source_before_destination() {
        let src = bytes(&[0; 2]);
        let dst = bytes(&[0; 2]).as_read_only();
        assert!(copy(&src, 0, &dst, 0, 4).unwrap_err().is_out_of_bounds());
        assert_eq!(copy(&src, 0, &dst, 0, 2), Err(SegmentError::ReadOnly));
    }

    #[test]
    fn copy_elements_swaps_on_order_change() {
        let src = Segment::of_vec(vec![0u8; 8]);
        let dst = Segment::of_vec(vec![0u8; 8]);
        let little = INT_UNALIGNED.with_order(ByteOrder::Little);
        let big = INT_UNALIGNED.with_order(ByteOrder::Big);
        src.set(&little, 0, 0x0A0B_0C0D).unwrap();
        src.set(&little, 4, 7).unwrap();
        copy_elements(&src, &little, 0, &dst, &big, 0, 2).unwrap();
        assert_eq!(dst.get(&big, 0).unwrap(), 0x0A0B_0C0D);
        assert_eq!(dst.get(&big, 4).unwrap(), 7);
        assert_eq!(dst.to_vec(&U8).unwrap()[..4], [0x0A, 0x0B, 0x0C, 0x0D]);
    }

    #[test]
    fn swapped_copy_onto_overlapping_self() {
        let little = INT_UNALIGNED.with_order(ByteOrder::Little);
        let big = INT_UNALIGNED.with_order(ByteOrder::Big);
        // (src_offset, dst_offset): shift right, then left.
        for (from, to) in [(0usize, 4usize), (4, 0), (1, 3), (3, 1)] {
            let seg = bytes(&(1..=12).collect::<Vec<u8>>());
            let original = seg.to_vec(&U8).unwrap();
            let staged: Vec<u8> = original[from..from + 8]
                .chunks_exact(4)
                .flat_map(|c| c.iter().rev().copied())
                .collect();
            let mut expected = original.clone();
            expected[to..to + 8].copy_from_slice(&staged);

            copy_elements(&seg, &little, from as u64, &seg, &big, to as u64, 2).unwrap();
            assert_eq!(seg.to_vec(&U8).unwrap(), expected, "from {from} to {to}");
        }
    }

    #[test]
    fn copy_elements_requires_matching_sizes() {
        let seg = Segment::of_vec(vec![0i32; 4]);
        assert!(matches!(
            copy_elements(&seg, &INT, 0, &seg, &SHORT, 0, 1),
            Err(SegmentError::IllegalArgument { .. })
        ));
    }

    #[test]
    fn fill_sets_every_byte() {
        let seg = bytes(&[0; 5]);
        seg.as_slice(1).unwrap().fill(0xAB).unwrap();
        assert_eq!(seg.to_vec(&U8).unwrap(), vec![0, 0xAB, 0xAB, 0xAB, 0xAB]);
        assert_eq!(seg.as_read_only().fill(1), Err(SegmentError::ReadOnly));
    }

    #[test]
    fn mismatch_cases() {
        let a = bytes(&[1, 2, 3, 4]);
        assert_eq!(a.mismatch(&a).unwrap(), None);
        assert_eq!(a.mismatch(&bytes(&[1, 2, 9, 4])).unwrap(), Some(2));
        assert_eq!(a.mismatch(&bytes(&[1, 2])).unwrap(), Some(2));
        assert_eq!(bytes(&[]).mismatch(&bytes(&[])).unwrap(), None);
        assert_eq!(bytes(&[]).mismatch(&a).unwrap(), Some(0));
        assert_eq!(
            mismatch_range(&a, 1, 3, &bytes(&[2, 3]), 0, 2).unwrap(),
            None
        );
        assert!(mismatch_range(&a, 3, 1, &a, 0, 1).unwrap_err().is_out_of_bounds());
    }

    #[test]
    fn slices_round_trip_with_byte_order() {
        let seg = Segment::of_vec(vec![0u8; 8]);
        let big = INT_UNALIGNED.with_order(ByteOrder::Big);
        seg.copy_from_slice(&[1, 0x0102_0304], &big, 0).unwrap();
        assert_eq!(seg.to_vec(&U8).unwrap(), vec![0, 0, 0, 1, 1, 2, 3, 4]);
        let mut out = [0i32; 2];
        seg.copy_to_slice(&big, 0, &mut out).unwrap();
        assert_eq!(out, [1, 0x0102_0304]);
        let mut too_many = [0i32; 3];
        assert!(seg.copy_to_slice(&big, 0, &mut too_many).unwrap_err().is_out_of_bounds());
    }

    #[test]
    fn copy_from_fills_prefix() {
        let dst = bytes(&[0; 4]);
        dst.copy_from(&bytes(&[9, 8])).unwrap();
        assert_eq!(dst.to_vec(&U8).unwrap(), vec![9, 8, 0, 0]);
        assert!(bytes(&[0; 1]).copy_from(&dst).unwrap_err().is_out_of_bounds());
    }

    proptest! {
        #[test]
        fn single_difference_is_found(data in proptest::collection::vec(any::<u8>(), 1..256), k in any::<prop::sample::Index>()) {
            let k = k.index(data.len());
            let mut other = data.clone();
            other[k] = other[k].wrapping_add(1);
            let a = Segment::of_vec(data);
            let b = Segment::of_vec(other);
            prop_assert_eq!(a.mismatch(&b).unwrap(), Some(k as u64));
            prop_assert_eq!(a.mismatch(&a).unwrap(), None);
        }
    }
}
