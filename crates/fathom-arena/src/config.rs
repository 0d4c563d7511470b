//! Arena and native-access configuration.
//!
//! Both can be set programmatically or loaded from environment
//! variables. All variables use the `FATHOM_` prefix:
//!
//! | Variable | Meaning |
//! |---|---|
//! | `FATHOM_MAX_ALLOC_BYTES` | [`ArenaConfig::max_alloc_bytes`] |
//! | `FATHOM_ZERO_MEMORY` | [`ArenaConfig::zero_memory`] (`true/false/1/0/yes/no/on/off`) |
//! | `FATHOM_DRAIN_SPINS` | [`ArenaConfig::drain_spin_limit`] |
//! | `FATHOM_NATIVE_ACCESS` | [`NativeAccessPolicy`] (`allow`, `warn`, `deny`) |

use std::env;
use std::fmt;
use std::str::FromStr;

use crate::error::ArenaError;

/// Configuration for an [`Arena`](crate::Arena).
///
/// Validated when the arena is created; immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Largest single allocation the arena accepts, in bytes.
    ///
    /// Default: `isize::MAX`, the largest block the system allocator can
    /// describe. Must be non-zero.
    pub max_alloc_bytes: u64,

    /// Whether freshly allocated blocks are zero-filled.
    ///
    /// Default: `true`. Turning this off leaves new segments with
    /// whatever bytes the system allocator hands back.
    pub zero_memory: bool,

    /// Busy-wait iterations a closing shared scope spends waiting for
    /// in-flight accesses before it starts yielding the thread.
    ///
    /// Default: 64.
    pub drain_spin_limit: u32,
}

impl ArenaConfig {
    /// Default per-allocation cap.
    pub const DEFAULT_MAX_ALLOC_BYTES: u64 = isize::MAX as u64;

    /// Default spin budget for shared-scope close.
    pub const DEFAULT_DRAIN_SPIN_LIMIT: u32 = 64;

    /// Load configuration from the process environment.
    ///
    /// Unset or unparsable variables keep their default value.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(val) = lookup("FATHOM_MAX_ALLOC_BYTES").and_then(|s| s.trim().parse().ok()) {
            config.max_alloc_bytes = val;
        }
        if let Some(val) = lookup("FATHOM_ZERO_MEMORY").and_then(|s| parse_bool(&s)) {
            config.zero_memory = val;
        }
        if let Some(val) = lookup("FATHOM_DRAIN_SPINS").and_then(|s| s.trim().parse().ok()) {
            config.drain_spin_limit = val;
        }
        config
    }

    /// Check that every value is in range.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> Result<(), ArenaError> {
        if self.max_alloc_bytes == 0 {
            return Err(ArenaError::InvalidConfig {
                reason: "max_alloc_bytes must be non-zero".into(),
            });
        }
        if self.max_alloc_bytes > Self::DEFAULT_MAX_ALLOC_BYTES {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "max_alloc_bytes {} exceeds isize::MAX",
                    self.max_alloc_bytes
                ),
            });
        }
        Ok(())
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            max_alloc_bytes: Self::DEFAULT_MAX_ALLOC_BYTES,
            zero_memory: true,
            drain_spin_limit: Self::DEFAULT_DRAIN_SPIN_LIMIT,
        }
    }
}

/// How restricted native operations react when a caller asks for access.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum NativeAccessPolicy {
    /// Grant silently.
    Allow,
    /// Grant, but log a warning the first time each caller asks.
    #[default]
    Warn,
    /// Refuse with [`SegmentError::IllegalNativeAccess`](fathom_core::SegmentError::IllegalNativeAccess).
    Deny,
}

impl NativeAccessPolicy {
    /// Read `FATHOM_NATIVE_ACCESS`, if it is set to a recognized value.
    pub fn from_env() -> Option<Self> {
        env::var("FATHOM_NATIVE_ACCESS").ok()?.parse().ok()
    }

    /// Lower-case name, as accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Warn => "warn",
            Self::Deny => "deny",
        }
    }
}

impl FromStr for NativeAccessPolicy {
    type Err = ArenaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "warn" => Ok(Self::Warn),
            "deny" => Ok(Self::Deny),
            other => Err(ArenaError::InvalidConfig {
                reason: format!("unknown native access policy '{other}'"),
            }),
        }
    }
}

impl fmt::Display for NativeAccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = ArenaConfig::default();
        assert!(config.zero_memory);
        assert_eq!(config.drain_spin_limit, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = ArenaConfig::from_lookup(lookup(&[
            ("FATHOM_MAX_ALLOC_BYTES", "4096"),
            ("FATHOM_ZERO_MEMORY", "off"),
            ("FATHOM_DRAIN_SPINS", " 8 "),
        ]));
        assert_eq!(config.max_alloc_bytes, 4096);
        assert!(!config.zero_memory);
        assert_eq!(config.drain_spin_limit, 8);
    }

    #[test]
    fn unparsable_values_keep_defaults() {
        let config = ArenaConfig::from_lookup(lookup(&[
            ("FATHOM_MAX_ALLOC_BYTES", "lots"),
            ("FATHOM_ZERO_MEMORY", "maybe"),
        ]));
        assert_eq!(config, ArenaConfig::default());
    }

    #[test]
    fn zero_cap_is_rejected() {
        let config = ArenaConfig {
            max_alloc_bytes: 0,
            ..ArenaConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ArenaError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("Deny".parse::<NativeAccessPolicy>().unwrap(), NativeAccessPolicy::Deny);
        assert_eq!(" allow".parse::<NativeAccessPolicy>().unwrap(), NativeAccessPolicy::Allow);
        assert!("sometimes".parse::<NativeAccessPolicy>().is_err());
        assert_eq!(NativeAccessPolicy::default(), NativeAccessPolicy::Warn);
        assert_eq!(NativeAccessPolicy::Warn.to_string(), "warn");
    }
}
