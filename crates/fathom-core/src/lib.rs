//! Core types for the Fathom memory segment model.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by the rest of the workspace: the access error
//! taxonomy, scope identifiers, and the layout descriptions (size,
//! alignment, byte order, carrier type) that parametrize every typed
//! access on a segment. The [`NativeAccess`] capability token also lives
//! here because layouts need it to declare pointer targets.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod capability;
pub mod error;
pub mod id;
pub mod layout;

pub use capability::NativeAccess;
pub use error::SegmentError;
pub use id::ScopeId;
pub use layout::{
    AddressLayout, ByteOrder, Carrier, Layout, MemoryLayout, ValueLayout, ADDRESS,
    ADDRESS_SIZE, ADDRESS_UNALIGNED, BOOL, BYTE, CHAR, CHAR_UNALIGNED, DOUBLE, DOUBLE_UNALIGNED,
    FLOAT, FLOAT_UNALIGNED, INT, INT_UNALIGNED, LONG, LONG_UNALIGNED, SHORT, SHORT_UNALIGNED, U8,
};
