//! Benchmark fixtures for Fathom segments.
//!
//! Provides pre-built segments for the criterion benches:
//!
//! - [`filled_native`]: an arena segment with a deterministic byte pattern
//! - [`filled_heap`]: the same pattern over a heap array
//! - [`SIZES`]: the transfer sizes every bulk benchmark sweeps

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use fathom_arena::{Arena, ArenaError, Segment};
use fathom_core::U8;

/// Transfer sizes, in bytes, swept by the bulk benchmarks.
pub const SIZES: [u64; 4] = [64, 4 * 1024, 64 * 1024, 1024 * 1024];

/// Byte `i` of every benchmark pattern.
pub fn pattern_byte(i: u64, seed: u64) -> u8 {
    (i.wrapping_mul(31).wrapping_add(seed) % 251) as u8
}

/// Allocate `len` bytes from `arena` and fill them with the pattern.
pub fn filled_native(arena: &Arena, len: u64, seed: u64) -> Result<Segment, ArenaError> {
    let seg = arena.allocate(len, 64)?;
    let bytes: Vec<u8> = (0..len).map(|i| pattern_byte(i, seed)).collect();
    seg.copy_from_slice(&bytes, &U8, 0)?;
    Ok(seg)
}

/// A heap segment of `len` 8-byte words holding the pattern.
pub fn filled_heap(len: u64, seed: u64) -> Segment {
    let words = (0..len / 8)
        .map(|w| {
            let mut bytes = [0u8; 8];
            for (j, b) in bytes.iter_mut().enumerate() {
                *b = pattern_byte(w * 8 + j as u64, seed);
            }
            u64::from_ne_bytes(bytes)
        })
        .collect::<Vec<u64>>();
    Segment::of_vec(words)
}
