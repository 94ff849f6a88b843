//! # Runtime configuration.
//!
//! Provides [`Config`] centralized settings for the relay runtime.
//!
//! Config is used in two ways:
//! 1. **Runtime creation**: `Runtime::builder(config)`
//! 2. **Payload decoding**: the callback bridge reads [`Config::message_limit`]
//!
//! ## Sentinel values
//! - `max_message_bytes = 0` → unlimited message length

/// Global configuration for the relay runtime.
///
/// ## Field semantics
/// - `default_service`: Service name used by [`Runtime::open_default`](crate::Runtime::open_default)
/// - `bus_capacity`: Diagnostics bus ring buffer size (min 1; clamped by Bus)
/// - `max_message_bytes`: Longest accepted message text (`0` = unlimited)
///
/// ## Notes
/// All fields are public for flexibility. Prefer the helper accessors to avoid
/// sprinkling sentinel checks (`0`) across the codebase.
#[derive(Clone, Debug)]
pub struct Config {
    /// Service name used when the caller does not name one.
    ///
    /// For the UDP backend `"0"` means "any free port".
    pub default_service: String,

    /// Capacity of the diagnostics bus broadcast channel.
    ///
    /// Observers that lag behind more than `bus_capacity` events will receive
    /// `Lagged` and skip older items. Minimum value is 1 (enforced by Bus).
    pub bus_capacity: usize,

    /// Maximum decoded message length in bytes.
    ///
    /// - `0` = unlimited
    /// - `n > 0` = longer payloads are dropped as `DecodeError::TooLong`
    pub max_message_bytes: usize,
}

impl Config {
    /// Returns the message length limit as an `Option`.
    ///
    /// - `None` → unlimited
    /// - `Some(n)` → payloads longer than `n` bytes are dropped
    #[inline]
    pub fn message_limit(&self) -> Option<usize> {
        if self.max_message_bytes == 0 {
            None
        } else {
            Some(self.max_message_bytes)
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `default_service = "0"` (ephemeral service)
    /// - `bus_capacity = 1024`
    /// - `max_message_bytes = 0` (unlimited)
    fn default() -> Self {
        Self {
            default_service: "0".to_string(),
            bus_capacity: 1024,
            max_message_bytes: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_limit_is_unlimited() {
        let cfg = Config::default();
        assert_eq!(cfg.message_limit(), None);

        let cfg = Config {
            max_message_bytes: 255,
            ..Config::default()
        };
        assert_eq!(cfg.message_limit(), Some(255));
    }
}
