//! Error types used by the relay runtime and the callback bridge.
//!
//! This module defines two enums:
//!
//! - [`RelayError`]: construction-time failures surfaced synchronously to the
//!   caller of [`Runtime::initialize`](crate::Runtime::initialize) or
//!   [`Runtime::open`](crate::Runtime::open).
//! - [`DecodeError`]: per-payload failures inside the callback bridge. These are
//!   recovered locally (the payload is dropped) and never reach a subscriber.
//!
//! Both provide `as_label` / `as_message` helpers for logs and diagnostics events.

use thiserror::Error;

/// # Errors produced while initializing the runtime or opening a relay.
///
/// Initialization failures are cached by the runtime and never retried.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Process-wide native setup failed.
    #[error("native initialization failed: {reason}")]
    Initialization {
        /// Diagnostic text produced by the native layer.
        reason: String,
    },

    /// A relay was requested before [`Runtime::initialize`](crate::Runtime::initialize) succeeded.
    #[error("runtime is not initialized")]
    NotInitialized,

    /// The native layer could not create a handle for the service.
    #[error("cannot register service {service:?}: {reason}")]
    Registration {
        /// Requested service name.
        service: String,
        /// Diagnostic text produced by the native layer.
        reason: String,
    },

    /// The runtime was shut down; no further relays can be opened.
    #[error("runtime is shut down")]
    ShutDown,
}

impl RelayError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use netlog_relay::RelayError;
    ///
    /// let err = RelayError::Registration { service: "1979".into(), reason: "in use".into() };
    /// assert_eq!(err.as_label(), "relay_registration");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RelayError::Initialization { .. } => "relay_initialization",
            RelayError::NotInitialized => "relay_not_initialized",
            RelayError::Registration { .. } => "relay_registration",
            RelayError::ShutDown => "relay_shut_down",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RelayError::Initialization { reason } => format!("init: {reason}"),
            RelayError::NotInitialized => "not initialized".to_string(),
            RelayError::Registration { service, reason } => {
                format!("service={service} reason={reason}")
            }
            RelayError::ShutDown => "shut down".to_string(),
        }
    }
}

/// # Errors produced while decoding a native payload.
///
/// The offending payload is dropped; the relay keeps running.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload text is not valid UTF-8.
    #[error("payload is not valid utf-8 (valid up to byte {valid_up_to})")]
    InvalidUtf8 {
        /// Length of the longest valid prefix.
        valid_up_to: usize,
    },

    /// Payload text exceeds the configured maximum.
    #[error("payload of {len} bytes exceeds limit of {limit} bytes")]
    TooLong {
        /// Decoded text length in bytes.
        len: usize,
        /// Configured limit.
        limit: usize,
    },
}

impl DecodeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use netlog_relay::DecodeError;
    ///
    /// let err = DecodeError::TooLong { len: 300, limit: 255 };
    /// assert_eq!(err.as_label(), "decode_too_long");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            DecodeError::InvalidUtf8 { .. } => "decode_invalid_utf8",
            DecodeError::TooLong { .. } => "decode_too_long",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            DecodeError::InvalidUtf8 { valid_up_to } => {
                format!("invalid utf-8 after {valid_up_to} bytes")
            }
            DecodeError::TooLong { len, limit } => format!("len={len} limit={limit}"),
        }
    }
}
