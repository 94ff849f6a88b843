//! # Callback consumers for relay messages.
//!
//! A [`Consumer`] is the callback-shaped alternative to a stream
//! [`Subscription`](crate::Subscription). It is attached with
//! [`Relay::sink`](crate::Relay::sink) and invoked on the delivery scheduler.
//!
//! ## Architecture
//! ```text
//! Relay::receive ──► scheduler ──► Slot::deliver
//!                                     │
//!                                ┌────┴─────┬──────────┐
//!                                ▼          ▼          ▼
//!                            LogWriter  ConsumerFn  Custom ...
//!                                     (panic caught → SubscriberPanicked)
//! ```
//!
//! ## Implementing a consumer
//! ```rust
//! use netlog_relay::{Consumer, Message};
//!
//! struct Counter(std::sync::atomic::AtomicUsize);
//!
//! impl Consumer for Counter {
//!     fn on_message(&self, _message: &Message) {
//!         self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//!     }
//!
//!     fn name(&self) -> &'static str { "counter" }
//! }
//! ```

mod consumer;
#[cfg(feature = "logging")]
mod log;

pub use consumer::{Consumer, ConsumerFn};
#[cfg(feature = "logging")]
pub use log::LogWriter;
