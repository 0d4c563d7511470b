//! Test utilities and mock collaborators for Fathom development.
//!
//! Provides a recording [`MockMapping`] implementation of
//! [`FileMapping`] and, in [`fixtures`], a mapping that parks the calling
//! thread inside a scope plus helpers for building patterned segments.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use fathom_arena::FileMapping;
use fathom_core::SegmentError;
use parking_lot::Mutex;

/// One call observed by a [`MockMapping`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MappingCall {
    Load { address: u64, length: u64 },
    Unload { address: u64, length: u64 },
    IsLoaded { address: u64, length: u64 },
    Force { address: u64, length: u64 },
}

/// Records every request and tracks a single "resident" flag.
///
/// `load` marks the mapping resident and `unload` clears it. Set
/// [`fail_force`](MockMapping::fail_force) to make `force` report an I/O
/// failure.
#[derive(Debug, Default)]
pub struct MockMapping {
    calls: Mutex<Vec<MappingCall>>,
    resident: Mutex<bool>,
    fail_force: Mutex<bool>,
}

impl MockMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `force` calls fail.
    pub fn fail_force(&self) {
        *self.fail_force.lock() = true;
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<MappingCall> {
        self.calls.lock().clone()
    }
}

impl FileMapping for MockMapping {
    fn load(&self, address: u64, length: u64) -> Result<(), SegmentError> {
        self.calls.lock().push(MappingCall::Load { address, length });
        *self.resident.lock() = true;
        Ok(())
    }

    fn unload(&self, address: u64, length: u64) -> Result<(), SegmentError> {
        self.calls.lock().push(MappingCall::Unload { address, length });
        *self.resident.lock() = false;
        Ok(())
    }

    fn is_loaded(&self, address: u64, length: u64) -> Result<bool, SegmentError> {
        self.calls
            .lock()
            .push(MappingCall::IsLoaded { address, length });
        Ok(*self.resident.lock())
    }

    fn force(&self, address: u64, length: u64) -> Result<(), SegmentError> {
        self.calls.lock().push(MappingCall::Force { address, length });
        if *self.fail_force.lock() {
            return Err(SegmentError::MappingFailed {
                reason: "msync failed".into(),
            });
        }
        Ok(())
    }
}
