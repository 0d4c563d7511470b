//! The native-access capability token.
//!
//! Restricted operations (reinterpreting a segment's bounds, attaching a
//! target layout to an address layout, wrapping a mapped region) can
//! manufacture views over arbitrary addresses. They take a
//! [`NativeAccess`] argument instead of inspecting their caller: holding
//! a token is the proof that someone vouched for the addresses involved.

#![allow(unsafe_code)]

use std::fmt;

/// Proof that the holder may perform restricted native operations.
///
/// The only constructor is `unsafe`. Most callers should obtain a token
/// through the arena crate's policy-aware `enable_native_access`, which
/// also applies the process-wide native access policy.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeAccess {
    caller: &'static str,
}

impl NativeAccess {
    /// Mint a token without consulting any policy.
    ///
    /// # Safety
    ///
    /// Segments produced with this token may cover any address. The
    /// caller must ensure that every address range it reinterprets,
    /// targets or maps is valid for the accesses later performed through
    /// those segments, for as long as their scopes stay alive.
    pub unsafe fn assume_granted(caller: &'static str) -> Self {
        Self { caller }
    }

    /// Name the token was granted to.
    pub fn caller(&self) -> &'static str {
        self.caller
    }
}

impl fmt::Debug for NativeAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeAccess")
            .field("caller", &self.caller)
            .finish()
    }
}
