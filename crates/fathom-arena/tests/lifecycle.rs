//! Integration test: segment lifecycle across arena kinds.
//!
//! Allocates from confined, shared and auto arenas, exercises typed and
//! bulk access, then verifies that closing (explicitly or by drop) makes
//! every operation on every derived segment fail with `ScopeNotAlive`.

use fathom_arena::{copy, Arena, ArenaError, ScopeKind, Segment, SegmentAllocator};
use fathom_core::{SegmentError, INT, LONG, U8};
use fathom_test_utils::fixtures::{patterned, patterned_heap};

// ── Basic scenario ──────────────────────────────────────────────

#[test]
fn allocate_write_read_close() {
    let arena = Arena::of_confined();
    let seg = arena.allocate(16, 8).unwrap();
    seg.set(&LONG, 0, 42).unwrap();
    assert_eq!(seg.get(&LONG, 0).unwrap(), 42);

    arena.close().unwrap();
    assert!(!arena.scope().is_alive());
    assert_eq!(seg.get(&LONG, 0), Err(SegmentError::ScopeNotAlive));
}

#[test]
fn every_operation_fails_after_close() {
    let arena = Arena::of_shared();
    let seg = patterned(&arena, 32);
    let slice = seg.as_slice_sized(8, 8).unwrap();
    let outside = patterned_heap(32);

    arena.close().unwrap();

    assert_eq!(seg.get(&U8, 0), Err(SegmentError::ScopeNotAlive));
    assert_eq!(seg.set(&U8, 0, 1), Err(SegmentError::ScopeNotAlive));
    assert_eq!(slice.get(&LONG, 0), Err(SegmentError::ScopeNotAlive));
    assert_eq!(seg.as_slice(4).unwrap_err(), SegmentError::ScopeNotAlive);
    assert_eq!(seg.fill(0), Err(SegmentError::ScopeNotAlive));
    assert_eq!(
        copy(&outside, 0, &seg, 0, 4),
        Err(SegmentError::ScopeNotAlive)
    );
    assert_eq!(
        copy(&seg, 0, &outside, 0, 4),
        Err(SegmentError::ScopeNotAlive)
    );
    assert_eq!(seg.mismatch(&outside), Err(SegmentError::ScopeNotAlive));
    assert_eq!(seg.get_utf8_string(0), Err(SegmentError::ScopeNotAlive));

    // The heap segment is unaffected.
    assert_eq!(outside.get(&U8, 31).unwrap(), 31);
}

#[test]
fn liveness_is_reported_before_bounds() {
    let arena = Arena::of_confined();
    let seg = arena.allocate(4, 4).unwrap();
    arena.close().unwrap();
    assert_eq!(seg.get(&LONG, 1024), Err(SegmentError::ScopeNotAlive));
}

// ── Confinement ─────────────────────────────────────────────────

#[test]
fn confined_segments_reject_other_threads() {
    let arena = Arena::of_confined();
    let seg = arena.allocate(8, 8).unwrap();
    seg.set(&INT, 0, 5).unwrap();

    let remote = seg.clone();
    let (read, accessible) = std::thread::spawn(move || {
        (
            remote.get(&INT, 0),
            remote.is_accessible_by(std::thread::current().id()),
        )
    })
    .join()
    .unwrap();
    assert_eq!(read, Err(SegmentError::WrongThread));
    assert!(!accessible);
    assert!(seg.is_accessible_by(std::thread::current().id()));
}

#[test]
fn confined_arena_closed_elsewhere_fails_wrong_thread() {
    let arena = Arena::of_confined();
    let seg = arena.allocate(8, 8).unwrap();
    std::thread::scope(|s| {
        s.spawn(|| {
            assert_eq!(
                arena.close(),
                Err(ArenaError::Access(SegmentError::WrongThread))
            );
        });
    });
    assert!(seg.scope().is_alive());
    arena.close().unwrap();
}

#[test]
fn shared_segments_work_from_any_thread() {
    let arena = Arena::of_shared();
    let seg = arena.allocate(8 * 4, 8).unwrap();
    std::thread::scope(|s| {
        for i in 0..4u64 {
            let seg = seg.clone();
            s.spawn(move || seg.set_at_index(&LONG, i, i as i64 * 3).unwrap());
        }
    });
    let values: Vec<i64> = (0..4).map(|i| seg.get_at_index(&LONG, i).unwrap()).collect();
    assert_eq!(values, vec![0, 3, 6, 9]);
}

// ── Drop and auto release ──────────────────────────────────────

#[test]
fn dropping_arena_closes_it() {
    let seg = {
        let arena = Arena::of_shared();
        arena.allocate(8, 8).unwrap()
    };
    assert_eq!(seg.get(&LONG, 0), Err(SegmentError::ScopeNotAlive));
}

#[test]
fn auto_segments_stay_valid_without_the_arena() {
    let seg = {
        let arena = Arena::of_auto();
        arena.allocate_from(&INT, &[4, 5, 6]).unwrap()
    };
    assert_eq!(seg.scope().kind(), ScopeKind::Auto);
    assert_eq!(seg.to_vec(&INT).unwrap(), vec![4, 5, 6]);
}

#[test]
fn global_arena_is_shared_and_alive() {
    let a = Arena::global();
    let b = Arena::global();
    assert!(std::ptr::eq(a, b));
    let seg = a.allocate_utf8("forever").unwrap();
    assert_eq!(seg.get_utf8_string(0).unwrap(), "forever");
}

// ── Heap segments ───────────────────────────────────────────────

#[test]
fn heap_byte_array_alignment() {
    let seg = Segment::of_vec(vec![0u8; 10]);
    assert!(matches!(
        seg.get(&INT, 0),
        Err(SegmentError::Misaligned { .. })
    ));
    assert_eq!(seg.get(&fathom_core::INT_UNALIGNED, 0).unwrap(), 0);
}

#[test]
fn heap_contents_are_shared_between_slices() {
    let seg = patterned_heap(16);
    let tail = seg.as_slice(8).unwrap();
    tail.set(&U8, 0, 0xEE).unwrap();
    assert_eq!(seg.get(&U8, 8).unwrap(), 0xEE);
    drop(seg);
    assert_eq!(tail.get(&U8, 1).unwrap(), 9);
}
