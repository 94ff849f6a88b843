//! # Diagnostics events emitted by the relay runtime.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Lifecycle events**: runtime initialization, relays opened and closed
//! - **Subscription events**: subscriptions added and cancelled
//! - **Fault events**: dropped payloads, subscriber panics, contract violations
//!
//! The [`Event`] struct carries additional metadata such as timestamps, the relay's
//! service name, the subscription id and a reason.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use netlog_relay::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::PayloadDropped)
//!     .with_relay("1979")
//!     .with_reason("decode_invalid_utf8");
//!
//! assert_eq!(ev.kind, EventKind::PayloadDropped);
//! assert_eq!(ev.relay.as_deref(), Some("1979"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of diagnostics events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Runtime lifecycle ===
    /// Native global setup completed.
    RuntimeInitialized,

    /// Native global setup failed.
    ///
    /// Sets:
    /// - `reason`: native diagnostic text
    InitializationFailed,

    /// Delivery scheduler stopped after `Runtime::shutdown`.
    SchedulerStopped,

    // === Relay lifecycle ===
    /// Relay created and its callback registered.
    ///
    /// Sets:
    /// - `relay`: service name
    RelayOpened,

    /// Relay torn down (all subscriptions cancelled, native handle released).
    ///
    /// Sets:
    /// - `relay`: service name
    RelayClosed,

    // === Subscriptions ===
    /// New subscription became active.
    ///
    /// Sets:
    /// - `relay`: service name
    /// - `subscription`: subscription id
    SubscriptionAdded,

    /// Subscription cancelled (explicitly, by drop, or by relay teardown).
    ///
    /// Sets:
    /// - `relay`: service name
    /// - `subscription`: subscription id
    SubscriptionCancelled,

    // === Faults ===
    /// Native payload could not be decoded and was dropped.
    ///
    /// Sets:
    /// - `relay`: service name
    /// - `reason`: decode error label
    PayloadDropped,

    /// Callback consumer panicked while handling a message.
    ///
    /// Sets:
    /// - `relay`: service name
    /// - `subscription`: subscription id
    /// - `subscriber`: consumer name
    /// - `reason`: panic message
    SubscriberPanicked,

    /// Native layer invoked a callback for a relay that no longer exists.
    ///
    /// Sets:
    /// - `reason`: relay key
    LateCallback,

    /// A message arrived after the scheduler stopped and was not delivered.
    ///
    /// Sets:
    /// - `relay`: service name
    DeliveryDropped,
}

/// Diagnostics event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Service name of the relay, if applicable.
    pub relay: Option<Arc<str>>,
    /// Subscription id, if applicable.
    pub subscription: Option<u64>,
    /// Consumer name, if applicable.
    pub subscriber: Option<Arc<str>>,
    /// Human-readable reason (errors, panic details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            relay: None,
            subscription: None,
            subscriber: None,
            reason: None,
        }
    }

    /// Attaches the relay's service name.
    #[inline]
    pub fn with_relay(mut self, relay: impl Into<Arc<str>>) -> Self {
        self.relay = Some(relay.into());
        self
    }

    /// Attaches a subscription id.
    #[inline]
    pub fn with_subscription(mut self, id: u64) -> Self {
        self.subscription = Some(id);
        self
    }

    /// Attaches a consumer name.
    #[inline]
    pub fn with_subscriber(mut self, name: impl Into<Arc<str>>) -> Self {
        self.subscriber = Some(name.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(
        relay: Arc<str>,
        subscription: u64,
        subscriber: &'static str,
        info: String,
    ) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_relay(relay)
            .with_subscription(subscription)
            .with_subscriber(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_fault(&self) -> bool {
        matches!(
            self.kind,
            EventKind::PayloadDropped
                | EventKind::SubscriberPanicked
                | EventKind::LateCallback
                | EventKind::DeliveryDropped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_monotonic() {
        let a = Event::new(EventKind::RelayOpened);
        let b = Event::new(EventKind::RelayClosed);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_panic_event_fields() {
        let ev = Event::subscriber_panicked(Arc::from("1979"), 7, "printer", "boom".into());
        assert_eq!(ev.kind, EventKind::SubscriberPanicked);
        assert_eq!(ev.subscription, Some(7));
        assert_eq!(ev.subscriber.as_deref(), Some("printer"));
        assert_eq!(ev.reason.as_deref(), Some("boom"));
        assert!(ev.is_fault());
        assert!(!Event::new(EventKind::RelayOpened).is_fault());
    }
}
