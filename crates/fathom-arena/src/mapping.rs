//! Mapped segments.
//!
//! A mapped segment is a native segment whose pages belong to a file
//! mapping. The mapping itself is an external collaborator: this crate
//! only wraps the mapped range and forwards page-residency and
//! write-back requests to it.

use std::fmt;
use std::sync::Arc;

use fathom_core::{NativeAccess, SegmentError};

use crate::segment::{Segment, SegmentKind};
use crate::scope::Scope;

/// The file mapping behind a mapped segment.
///
/// Every method receives the absolute address and length of the segment
/// the request was made on, which may be a slice of the original mapping.
pub trait FileMapping: Send + Sync + fmt::Debug {
    /// Ask the OS to bring the range into physical memory.
    fn load(&self, address: u64, length: u64) -> Result<(), SegmentError>;

    /// Hint that the range is no longer needed in physical memory.
    fn unload(&self, address: u64, length: u64) -> Result<(), SegmentError>;

    /// Whether the whole range is resident.
    fn is_loaded(&self, address: u64, length: u64) -> Result<bool, SegmentError>;

    /// Write modified pages in the range back to the file.
    fn force(&self, address: u64, length: u64) -> Result<(), SegmentError>;
}

impl Segment {
    /// Wrap `byte_size` bytes at `address` that `mapping` has mapped.
    ///
    /// # Errors
    ///
    /// [`SegmentError::ScopeNotAlive`] or [`SegmentError::WrongThread`] if
    /// the segment could not be bound to `scope`.
    pub fn mapped(
        address: u64,
        byte_size: u64,
        mapping: Arc<dyn FileMapping>,
        scope: &Scope,
        read_only: bool,
        _access: &NativeAccess,
    ) -> Result<Segment, SegmentError> {
        drop(scope.acquire()?);
        Ok(Segment::from_parts(
            address,
            byte_size,
            SegmentKind::Mapped(mapping),
            read_only,
            scope.clone(),
        ))
    }

    /// Bring the segment's pages into memory.
    ///
    /// # Errors
    ///
    /// [`SegmentError::UnsupportedKind`] unless the segment is mapped;
    /// scope errors as for any access; whatever the mapping reports.
    pub fn load(&self) -> Result<(), SegmentError> {
        self.with_mapping("load", |m, addr, len| m.load(addr, len))
    }

    /// Release the segment's pages from memory.
    pub fn unload(&self) -> Result<(), SegmentError> {
        self.with_mapping("unload", |m, addr, len| m.unload(addr, len))
    }

    /// Whether every page of the segment is resident.
    pub fn is_loaded(&self) -> Result<bool, SegmentError> {
        self.with_mapping("is_loaded", |m, addr, len| m.is_loaded(addr, len))
    }

    /// Write modified pages back to the mapped file.
    pub fn force(&self) -> Result<(), SegmentError> {
        self.with_mapping("force", |m, addr, len| m.force(addr, len))
    }

    /// Run `op` against the mapping while holding the scope.
    fn with_mapping<T>(
        &self,
        operation: &'static str,
        op: impl FnOnce(&dyn FileMapping, u64, u64) -> Result<T, SegmentError>,
    ) -> Result<T, SegmentError> {
        let SegmentKind::Mapped(mapping) = self.kind() else {
            return Err(SegmentError::UnsupportedKind {
                operation,
                kind: self.kind().name(),
            });
        };
        let _guard = self.scope().acquire()?;
        op(mapping.as_ref(), self.address(), self.byte_size())
    }
}
