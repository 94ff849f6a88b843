//! # Consumer trait and the closure-backed [`ConsumerFn`].
//!
//! ## Rules
//! - `on_message` runs on the delivery scheduler, one message at a time; a
//!   consumer is never invoked concurrently with itself.
//! - Keep it short and non-blocking: every relay of the runtime shares the
//!   scheduler.
//! - Panics are caught and published as `EventKind::SubscriberPanicked`; the
//!   consumer stays subscribed.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use netlog_relay::{Consumer, ConsumerFn, Message};
//!
//! let printer: Arc<dyn Consumer> = ConsumerFn::arc("printer", |m: &Message| {
//!     println!("{m}");
//! });
//! assert_eq!(printer.name(), "printer");
//! ```

use std::fmt;
use std::sync::Arc;

use crate::message::Message;

/// Callback consumer attached to a relay with [`Relay::sink`](crate::Relay::sink).
pub trait Consumer: Send + Sync + 'static {
    /// Handles one message.
    ///
    /// Called from the delivery scheduler, never from the native thread.
    /// Messages arrive in the relay's arrival order.
    fn on_message(&self, message: &Message);

    /// Returns the consumer name used in logs and panic events.
    ///
    /// The default uses `type_name::<Self>()`, which can be verbose - override it when possible.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Function-backed consumer.
///
/// Wraps a closure called once per delivered message.
pub struct ConsumerFn<F> {
    name: &'static str,
    f: F,
}

impl<F> ConsumerFn<F>
where
    F: Fn(&Message) + Send + Sync + 'static,
{
    /// Creates a new function-backed consumer.
    ///
    /// Prefer [`ConsumerFn::arc`] when you immediately pass it to `Relay::sink`.
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }

    /// Creates the consumer and returns it as a shared handle (`Arc<dyn Consumer>`).
    pub fn arc(name: &'static str, f: F) -> Arc<dyn Consumer> {
        Arc::new(Self::new(name, f))
    }
}

impl<F> Consumer for ConsumerFn<F>
where
    F: Fn(&Message) + Send + Sync + 'static, // Fn, not FnMut
{
    fn on_message(&self, message: &Message) {
        (self.f)(message)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

impl<F> fmt::Debug for ConsumerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerFn").field("name", &self.name).finish()
    }
}
