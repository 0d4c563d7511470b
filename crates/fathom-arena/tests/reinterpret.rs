//! Integration test: zero-length wrapping and reinterpretation.
//!
//! Pointers read out of one segment come back as zero-length segments;
//! reinterpreting them against real arena memory makes that memory
//! reachable again, with the arena's scope and cleanup semantics.

use std::sync::Arc;

use fathom_arena::{
    enable_native_access, set_native_access_policy, Arena, NativeAccessPolicy, Segment,
    SegmentAllocator,
};
use fathom_core::{MemoryLayout, NativeAccess, SegmentError, ADDRESS, INT, LONG, U8};
use parking_lot::Mutex;

fn token() -> NativeAccess {
    set_native_access_policy(NativeAccessPolicy::Allow);
    // SAFETY: every segment reinterpreted in this file covers memory
    // allocated by an arena that outlives the accesses made through it.
    unsafe { enable_native_access("reinterpret-test") }.unwrap()
}

#[test]
fn pointer_round_trip_through_reinterpret() {
    let arena = Arena::of_confined();
    let target = arena.allocate_from(&INT, &[10, 20, 30]).unwrap();
    let cell = arena.allocate_layout(&ADDRESS).unwrap();
    cell.set_address(&ADDRESS, 0, &target).unwrap();

    let raw = cell.get_address(&ADDRESS, 0).unwrap();
    assert_eq!(raw.address(), target.address());
    assert_eq!(raw.byte_size(), 0);
    assert!(raw.get(&U8, 0).unwrap_err().is_out_of_bounds());

    let view = raw.reinterpret(12, &token()).unwrap();
    assert_eq!(view.byte_size(), 12);
    assert_eq!(view.get_at_index(&INT, 2).unwrap(), 30);
    assert!(view.get_at_index(&INT, 3).unwrap_err().is_out_of_bounds());
    assert_eq!(view, target);
}

#[test]
fn target_layout_sizes_pointer_reads() {
    let arena = Arena::of_confined();
    let target = arena.allocate(32, 16).unwrap();
    target.set(&LONG, 24, -9).unwrap();
    let cell = arena.allocate_layout(&ADDRESS).unwrap();
    cell.set_address(&ADDRESS, 0, &target).unwrap();

    let layout = ADDRESS.with_target_layout(MemoryLayout::new(32, 16).unwrap(), &token());
    let view = cell.get_address(&layout, 0).unwrap();
    assert_eq!(view.byte_size(), 32);
    assert_eq!(view.get(&LONG, 24).unwrap(), -9);
}

#[test]
fn reinterpret_into_scope_runs_cleanup_on_close() {
    let backing = Arena::of_auto();
    let block = backing.allocate(16, 8).unwrap();
    let raw = Segment::of_address(block.address());

    let freed = Arc::new(Mutex::new(Vec::new()));
    let owner = Arena::of_confined();
    let sink = Arc::clone(&freed);
    let view = raw
        .reinterpret_in(
            16,
            owner.scope(),
            Some(Box::new(move |s: Segment| sink.lock().push(s.address()))),
            &token(),
        )
        .unwrap();
    view.set(&LONG, 8, 77).unwrap();
    assert_eq!(block.get(&LONG, 8).unwrap(), 77);

    owner.close().unwrap();
    assert_eq!(*freed.lock(), vec![block.address()]);
    assert_eq!(view.get(&LONG, 8), Err(SegmentError::ScopeNotAlive));
    // The original memory belongs to the auto arena and is still usable.
    assert_eq!(block.get(&LONG, 8).unwrap(), 77);
}

#[test]
fn cleanups_run_in_registration_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let owner = Arena::of_shared();
    for address in [0x100u64, 0x200, 0x300] {
        let sink = Arc::clone(&order);
        Segment::of_address(address)
            .reinterpret_scope(
                owner.scope(),
                Some(Box::new(move |s: Segment| sink.lock().push(s.address()))),
                &token(),
            )
            .unwrap();
    }
    owner.close().unwrap();
    assert_eq!(*order.lock(), vec![0x100, 0x200, 0x300]);
}

#[test]
fn closed_owner_rejects_rebinding() {
    let owner = Arena::of_shared();
    owner.close().unwrap();
    assert_eq!(
        Segment::of_address(0x40).reinterpret_in(8, owner.scope(), None, &token()),
        Err(SegmentError::ScopeNotAlive)
    );
}

#[test]
fn heap_segments_are_not_reinterpretable() {
    let seg = Segment::of_vec(vec![0i32; 2]);
    assert!(matches!(
        seg.reinterpret(64, &token()),
        Err(SegmentError::UnsupportedKind { kind: "heap", .. })
    ));
}

#[cfg(target_pointer_width = "64")]
#[test]
fn unbounded_view_reads_strings_up_to_the_terminator() {
    let arena = Arena::of_confined();
    let text = arena.allocate_utf8("hello").unwrap();
    let other = arena.allocate_utf8("help").unwrap();

    let unbounded = Segment::of_address(text.address())
        .reinterpret(u64::MAX, &token())
        .unwrap();
    assert_eq!(unbounded.byte_size(), u64::MAX);
    assert_eq!(unbounded.get_utf8_string(0).unwrap(), "hello");
    assert_eq!(unbounded.get_utf8_string(3).unwrap(), "lo");

    let other_unbounded = Segment::of_address(other.address())
        .reinterpret(u64::MAX, &token())
        .unwrap();
    assert_eq!(
        fathom_arena::mismatch_range(&unbounded, 0, u64::MAX, &other_unbounded, 0, u64::MAX)
            .unwrap(),
        Some(3)
    );
}
