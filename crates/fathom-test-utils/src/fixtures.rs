//! Reusable segment fixtures.
//!
//! - [`patterned`] / [`patterned_heap`]: segments whose byte `i` is
//!   `i as u8`, so any misplaced byte shows up in assertions.
//! - [`GateMapping`]: a [`FileMapping`] whose `load` blocks until the
//!   test releases it, parking the caller inside the segment's scope.

use crossbeam_channel::{Receiver, Sender};
use fathom_arena::{Arena, FileMapping, Segment};
use fathom_core::{SegmentError, U8};

/// Allocate `len` bytes from `arena` and fill them with `0, 1, 2, ...`.
pub fn patterned(arena: &Arena, len: u64) -> Segment {
    let seg = arena.allocate(len, 8).expect("fixture allocation");
    for i in 0..len {
        seg.set(&U8, i, i as u8).expect("fixture write");
    }
    seg
}

/// A heap segment of `len` bytes holding `0, 1, 2, ...`.
pub fn patterned_heap(len: usize) -> Segment {
    Segment::of_vec((0..len).map(|i| i as u8).collect::<Vec<u8>>())
}

/// A mapping whose `load` signals entry and then waits for release.
///
/// `load` sends on `entered`, then blocks on `release`. Every other
/// operation returns immediately.
#[derive(Debug)]
pub struct GateMapping {
    entered: Sender<()>,
    release: Receiver<()>,
}

/// Test-side ends of a [`GateMapping`].
#[derive(Debug)]
pub struct Gate {
    /// Receives one message each time `load` is entered.
    pub entered: Receiver<()>,
    /// Send one message to let a parked `load` return.
    pub release: Sender<()>,
}

impl GateMapping {
    /// A mapping and the [`Gate`] that drives it.
    pub fn pair() -> (Self, Gate) {
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        (
            Self {
                entered: entered_tx,
                release: release_rx,
            },
            Gate {
                entered: entered_rx,
                release: release_tx,
            },
        )
    }
}

impl FileMapping for GateMapping {
    fn load(&self, _address: u64, _length: u64) -> Result<(), SegmentError> {
        let _ = self.entered.send(());
        self.release.recv().map_err(|_| SegmentError::MappingFailed {
            reason: "gate dropped".into(),
        })
    }

    fn unload(&self, _address: u64, _length: u64) -> Result<(), SegmentError> {
        Ok(())
    }

    fn is_loaded(&self, _address: u64, _length: u64) -> Result<bool, SegmentError> {
        Ok(true)
    }

    fn force(&self, _address: u64, _length: u64) -> Result<(), SegmentError> {
        Ok(())
    }
}
