//! Integration test: mapped segments delegate to their file mapping.

use std::sync::Arc;

use fathom_arena::{Arena, ArenaError, FileMapping, Segment};
use fathom_core::{NativeAccess, SegmentError};
use fathom_test_utils::{MappingCall, MockMapping};
use parking_lot::Mutex;

fn token() -> NativeAccess {
    // SAFETY: mapped segments in this file are never read or written;
    // only their mapping operations are exercised.
    unsafe { NativeAccess::assume_granted("mapped-test") }
}

#[test]
fn operations_reach_the_mapping_with_slice_ranges() {
    let arena = Arena::of_confined();
    let mapping = Arc::new(MockMapping::new());
    let seg = Segment::mapped(0x7000_0000, 8192, mapping.clone(), arena.scope(), false, &token())
        .unwrap();
    assert!(seg.is_mapped());

    assert!(!seg.is_loaded().unwrap());
    seg.load().unwrap();
    assert!(seg.is_loaded().unwrap());

    let page = seg.as_slice_sized(4096, 4096).unwrap();
    page.unload().unwrap();
    page.force().unwrap();

    assert_eq!(
        mapping.calls(),
        vec![
            MappingCall::IsLoaded { address: 0x7000_0000, length: 8192 },
            MappingCall::Load { address: 0x7000_0000, length: 8192 },
            MappingCall::IsLoaded { address: 0x7000_0000, length: 8192 },
            MappingCall::Unload { address: 0x7000_1000, length: 4096 },
            MappingCall::Force { address: 0x7000_1000, length: 4096 },
        ]
    );
}

#[test]
fn mapping_failures_are_reported() {
    let arena = Arena::of_shared();
    let mapping = Arc::new(MockMapping::new());
    mapping.fail_force();
    let seg = Segment::mapped(0x1000, 64, mapping, arena.scope(), true, &token()).unwrap();
    assert!(seg.is_read_only());
    assert!(matches!(seg.force(), Err(SegmentError::MappingFailed { .. })));
}

#[test]
fn closed_scope_stops_delegation() {
    let arena = Arena::of_confined();
    let mapping = Arc::new(MockMapping::new());
    let seg = Segment::mapped(0x1000, 64, mapping.clone(), arena.scope(), false, &token()).unwrap();
    arena.close().unwrap();
    assert_eq!(seg.load(), Err(SegmentError::ScopeNotAlive));
    assert!(mapping.calls().is_empty());
    assert!(Segment::mapped(0x1000, 64, mapping, arena.scope(), false, &token()).is_err());
}

#[test]
fn other_kinds_reject_mapping_operations() {
    let arena = Arena::of_confined();
    let native = arena.allocate(16, 8).unwrap();
    let unsupported = |operation| SegmentError::UnsupportedKind {
        operation,
        kind: "native",
    };
    assert_eq!(native.load(), Err(unsupported("load")));
    assert_eq!(native.unload(), Err(unsupported("unload")));
    assert_eq!(native.is_loaded(), Err(unsupported("is_loaded")));
    assert_eq!(native.force(), Err(unsupported("force")));
}

/// A mapping whose `load` tries to close the arena the segment lives in.
#[derive(Debug)]
struct ClosingMapping {
    arena: Arc<Arena>,
    outcome: Mutex<Option<Result<(), ArenaError>>>,
}

impl FileMapping for ClosingMapping {
    fn load(&self, _address: u64, _length: u64) -> Result<(), SegmentError> {
        *self.outcome.lock() = Some(self.arena.close());
        Ok(())
    }

    fn unload(&self, _address: u64, _length: u64) -> Result<(), SegmentError> {
        Ok(())
    }

    fn is_loaded(&self, _address: u64, _length: u64) -> Result<bool, SegmentError> {
        Ok(false)
    }

    fn force(&self, _address: u64, _length: u64) -> Result<(), SegmentError> {
        Ok(())
    }
}

#[test]
fn closing_own_arena_from_a_mapping_callback_fails_fast() {
    let arena = Arc::new(Arena::of_shared());
    let mapping = Arc::new(ClosingMapping {
        arena: Arc::clone(&arena),
        outcome: Mutex::new(None),
    });
    let seg = Segment::mapped(0x9000, 64, mapping.clone(), arena.scope(), false, &token()).unwrap();

    assert_eq!(seg.load(), Ok(()));
    assert_eq!(
        mapping.outcome.lock().take(),
        Some(Err(ArenaError::Access(SegmentError::ScopeInUse)))
    );
    assert!(arena.scope().is_alive());

    // Outside the callback the close goes through.
    arena.close().unwrap();
    assert_eq!(seg.load(), Err(SegmentError::ScopeNotAlive));
}
