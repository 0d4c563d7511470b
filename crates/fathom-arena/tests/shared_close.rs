//! Integration test: closing a shared arena while other threads access it.
//!
//! Two properties are checked:
//!
//! - close does not return while an access that began before it is still
//!   in flight (a mapped segment's `load` parks a thread inside the scope);
//! - once close has committed no access succeeds, and racing readers only
//!   ever observe `Ok` or `ScopeNotAlive`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use fathom_arena::{Arena, Segment};
use fathom_core::{NativeAccess, SegmentError, LONG};
use fathom_test_utils::fixtures::GateMapping;

fn token() -> NativeAccess {
    // SAFETY: the gate mapping never dereferences the mapped range and
    // the tests never access its bytes.
    unsafe { NativeAccess::assume_granted("shared-close-test") }
}

#[test]
fn close_waits_for_in_flight_access() {
    let arena = Arc::new(Arena::of_shared());
    let (mapping, gate) = GateMapping::pair();
    let seg = Segment::mapped(0x10_000, 4096, Arc::new(mapping), arena.scope(), false, &token())
        .unwrap();

    let loader = {
        let seg = seg.clone();
        std::thread::spawn(move || seg.load())
    };
    gate.entered.recv().unwrap();

    let (closed_tx, closed_rx) = crossbeam_channel::bounded(1);
    let closer = {
        let arena = Arc::clone(&arena);
        std::thread::spawn(move || {
            let result = arena.close();
            closed_tx.send(()).unwrap();
            result
        })
    };

    // Wait for the closer to flip the state, then check it is stuck
    // draining: the loader is parked inside the scope.
    while arena.scope().is_alive() {
        std::thread::yield_now();
    }
    assert_eq!(
        closed_rx.recv_timeout(Duration::from_millis(100)),
        Err(RecvTimeoutError::Timeout)
    );
    // New accesses are already refused while close drains.
    assert_eq!(seg.is_loaded(), Err(SegmentError::ScopeNotAlive));

    gate.release.send(()).unwrap();
    assert_eq!(loader.join().unwrap(), Ok(()));
    closed_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(closer.join().unwrap(), Ok(()));
    assert!(!arena.scope().is_alive());
}

#[test]
fn racing_readers_see_ok_or_closed() {
    let arena = Arena::of_shared();
    let seg = arena.allocate(64, 8).unwrap();
    for i in 0..8 {
        seg.set_at_index(&LONG, i, 0x5A5A).unwrap();
    }

    let (ready_tx, ready_rx) = crossbeam_channel::unbounded();
    let closed = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let seg = seg.clone();
            let ready = ready_tx.clone();
            let closed = Arc::clone(&closed);
            std::thread::spawn(move || {
                ready.send(()).unwrap();
                let mut ok_after_close = 0usize;
                loop {
                    let observed_closed = closed.load(Ordering::SeqCst);
                    match seg.get_at_index(&LONG, 3) {
                        Ok(value) => {
                            assert_eq!(value, 0x5A5A);
                            if observed_closed {
                                ok_after_close += 1;
                            }
                        }
                        Err(SegmentError::ScopeNotAlive) => return ok_after_close,
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                }
            })
        })
        .collect();

    for _ in 0..4 {
        ready_rx.recv().unwrap();
    }
    arena.close().unwrap();
    closed.store(true, Ordering::SeqCst);

    for reader in readers {
        assert_eq!(reader.join().unwrap(), 0);
    }
    assert_eq!(seg.get(&LONG, 0), Err(SegmentError::ScopeNotAlive));
}
