//! # Callback bridge: native payload → owned [`Message`] → relay.
//!
//! [`on_native_message`] is the one function every relay registers with its native
//! source. It runs on the native thread and does only minimal work there:
//!
//! ```text
//! callback(payload, ctx)
//!   ├─ resolve ctx → relay          (no relay: LateCallback, drop)
//!   ├─ decode payload → Message     (error: PayloadDropped, drop)
//!   └─ relay.receive(message)       (buffer + enqueue, returns immediately)
//! ```
//!
//! ## Decoding
//! - Bytes up to the first NUL are the text (C-string payloads are common).
//! - The text must be valid UTF-8.
//! - With a configured limit, longer text is rejected.
//!
//! The text is copied; nothing borrowed from the native buffer outlives the call.

use crate::error::DecodeError;
use crate::events::{Event, EventKind};
use crate::message::Message;
use crate::native::Context;

/// Entry point registered with every native source.
pub(crate) fn on_native_message(payload: &[u8], context: &Context) {
    let relay = context
        .registry
        .upgrade()
        .and_then(|registry| registry.lookup(context.key));

    let Some(relay) = relay else {
        tracing::warn!(
            key = context.key,
            len = payload.len(),
            "native callback for a relay that no longer exists"
        );
        context.bus.publish(
            Event::new(EventKind::LateCallback).with_reason(format!("relay_key={}", context.key)),
        );
        return;
    };

    match decode(payload, relay.message_limit()) {
        Ok(message) => relay.receive(message),
        Err(err) => relay.drop_payload(&err),
    }
}

/// Copies a native payload into an owned [`Message`].
pub(crate) fn decode(payload: &[u8], limit: Option<usize>) -> Result<Message, DecodeError> {
    let end = payload
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(payload.len());

    let text = std::str::from_utf8(&payload[..end]).map_err(|e| DecodeError::InvalidUtf8 {
        valid_up_to: e.valid_up_to(),
    })?;

    match limit {
        Some(limit) if text.len() > limit => Err(DecodeError::TooLong {
            len: text.len(),
            limit,
        }),
        _ => Ok(Message::new(text)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain_text() {
        let msg = decode(b"hello\n", None).unwrap();
        assert_eq!(msg, "hello\n");
    }

    #[test]
    fn test_decode_stops_at_nul() {
        let msg = decode(b"abc\0garbage\xff", None).unwrap();
        assert_eq!(msg, "abc");
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let err = decode(b"ok\xc3\x28", None).unwrap_err();
        assert_eq!(err, DecodeError::InvalidUtf8 { valid_up_to: 2 });
    }

    #[test]
    fn test_decode_enforces_limit() {
        assert!(decode(b"12345", Some(5)).is_ok());
        let err = decode(b"123456", Some(5)).unwrap_err();
        assert_eq!(err, DecodeError::TooLong { len: 6, limit: 5 });
    }

    #[test]
    fn test_decode_empty_payload() {
        assert!(decode(b"", None).unwrap().is_empty());
    }
}
