//! # Relay message value.
//!
//! A [`Message`] is the immutable text delivered to subscribers. It is always
//! copied out of the native payload before it leaves the callback bridge, so it
//! never aliases memory owned by the native layer.
//!
//! Cloning is cheap (`Arc<str>`), which is what fan-out needs: one allocation
//! per received payload regardless of the subscriber count.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Immutable owned message text.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Message(Arc<str>);

impl Message {
    /// Creates a message by copying `text`.
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    /// Returns the message text.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the length of the text in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Deref for Message {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Message {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl PartialEq<str> for Message {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for Message {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_text() {
        let a = Message::from("hello");
        let b = a.clone();
        assert!(std::ptr::eq(a.as_str(), b.as_str()));
        assert_eq!(b, "hello");
    }

    #[test]
    fn test_debug_and_display() {
        let m = Message::from(String::from("line\n"));
        assert_eq!(format!("{m}"), "line\n");
        assert_eq!(format!("{m:?}"), "\"line\\n\"");
        assert_eq!(m.len(), 5);
    }
}
