//! Native access policy and segment reinterpretation.
//!
//! Reinterpreting a segment lets it cover memory the allocator never
//! vouched for, so the operations here require a
//! [`NativeAccess`] token. [`enable_native_access`] mints one after
//! consulting the process-wide [`NativeAccessPolicy`].

#![allow(unsafe_code)]

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

use fathom_core::{NativeAccess, SegmentError};
use indexmap::IndexSet;
use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::config::NativeAccessPolicy;
use crate::scope::Scope;
use crate::segment::{Segment, SegmentKind};

const POLICY_UNSET: u8 = u8::MAX;

static POLICY: AtomicU8 = AtomicU8::new(POLICY_UNSET);

/// Callers already warned under [`NativeAccessPolicy::Warn`].
///
/// Each caller name is warned about at most once per process; the set
/// only deduplicates and is never iterated.
static WARNED: OnceLock<Mutex<IndexSet<&'static str>>> = OnceLock::new();

/// Cleanup invoked with a zero-length segment at the original address
/// when the owning scope of a reinterpreted segment closes.
pub type Cleanup = Box<dyn FnOnce(Segment) + Send + 'static>;

fn encode(policy: NativeAccessPolicy) -> u8 {
    match policy {
        NativeAccessPolicy::Allow => 0,
        NativeAccessPolicy::Warn => 1,
        NativeAccessPolicy::Deny => 2,
    }
}

fn decode(raw: u8) -> NativeAccessPolicy {
    match raw {
        0 => NativeAccessPolicy::Allow,
        2 => NativeAccessPolicy::Deny,
        _ => NativeAccessPolicy::Warn,
    }
}

/// Replace the process-wide native access policy.
pub fn set_native_access_policy(policy: NativeAccessPolicy) {
    POLICY.store(encode(policy), Ordering::Release);
}

/// The current policy. Read from `FATHOM_NATIVE_ACCESS` on first use.
pub fn native_access_policy() -> NativeAccessPolicy {
    let raw = POLICY.load(Ordering::Acquire);
    if raw != POLICY_UNSET {
        return decode(raw);
    }
    let policy = NativeAccessPolicy::from_env().unwrap_or_default();
    // Keep an explicitly set policy if one raced in.
    match POLICY.compare_exchange(POLICY_UNSET, encode(policy), Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => policy,
        Err(current) => decode(current),
    }
}

/// Request a native access token on behalf of `caller`.
///
/// # Safety
///
/// The same contract as [`NativeAccess::assume_granted`]: every segment
/// produced with the token must only cover memory that is valid for the
/// accesses made through it while its scope is alive.
///
/// # Errors
///
/// [`SegmentError::IllegalNativeAccess`] when the policy is
/// [`NativeAccessPolicy::Deny`].
pub unsafe fn enable_native_access(caller: &'static str) -> Result<NativeAccess, SegmentError> {
    match native_access_policy() {
        NativeAccessPolicy::Deny => {
            return Err(SegmentError::IllegalNativeAccess {
                caller: caller.to_string(),
            })
        }
        NativeAccessPolicy::Warn => {
            if first_request(caller) {
                warn!(caller = caller, "restricted native access enabled");
            }
        }
        NativeAccessPolicy::Allow => {}
    }
    // SAFETY: forwarded to our caller.
    Ok(unsafe { NativeAccess::assume_granted(caller) })
}

/// Record `caller`; `true` only the first time it is seen.
fn first_request(caller: &'static str) -> bool {
    WARNED
        .get_or_init(|| Mutex::new(IndexSet::new()))
        .lock()
        .insert(caller)
}

impl Segment {
    /// The same segment with a new size.
    ///
    /// # Errors
    ///
    /// [`SegmentError::UnsupportedKind`] for heap segments.
    pub fn reinterpret(&self, new_size: u64, access: &NativeAccess) -> Result<Segment, SegmentError> {
        self.require_off_heap("reinterpret")?;
        trace!(
            caller = access.caller(),
            address = self.address(),
            from = self.byte_size(),
            to = new_size,
            "reinterpret"
        );
        Ok(Segment::from_parts(
            self.address(),
            new_size,
            SegmentKind::Native,
            self.is_read_only(),
            self.scope().clone(),
        ))
    }

    /// The same segment bound to `scope`, keeping its size.
    pub fn reinterpret_scope(
        &self,
        scope: &Scope,
        cleanup: Option<Cleanup>,
        access: &NativeAccess,
    ) -> Result<Segment, SegmentError> {
        self.reinterpret_in(self.byte_size(), scope, cleanup, access)
    }

    /// The same address with a new size, bound to `scope`.
    ///
    /// When `scope` closes, `cleanup` (if any) receives a zero-length
    /// segment carrying the original address.
    ///
    /// # Errors
    ///
    /// [`SegmentError::UnsupportedKind`] for heap segments;
    /// [`SegmentError::ScopeNotAlive`] or [`SegmentError::WrongThread`] if
    /// `scope` cannot accept the binding.
    pub fn reinterpret_in(
        &self,
        new_size: u64,
        scope: &Scope,
        cleanup: Option<Cleanup>,
        access: &NativeAccess,
    ) -> Result<Segment, SegmentError> {
        self.require_off_heap("reinterpret")?;
        match cleanup {
            Some(cleanup) => {
                let address = self.address();
                scope.add_close_action(Box::new(move || cleanup(Segment::of_address(address))))?;
            }
            None => drop(scope.acquire()?),
        }
        trace!(
            caller = access.caller(),
            address = self.address(),
            to = new_size,
            scope = %scope.id(),
            "reinterpret into scope"
        );
        Ok(Segment::from_parts(
            self.address(),
            new_size,
            SegmentKind::Native,
            self.is_read_only(),
            scope.clone(),
        ))
    }

    fn require_off_heap(&self, operation: &'static str) -> Result<(), SegmentError> {
        match self.kind() {
            SegmentKind::Heap(_) => Err(SegmentError::UnsupportedKind {
                operation,
                kind: "heap",
            }),
            SegmentKind::Native | SegmentKind::Mapped(_) => Ok(()),
        }
    }
}
