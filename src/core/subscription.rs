//! # Subscriptions: per-consumer delivery slots and their public handles.
//!
//! Every subscribe call creates one [`Slot`] owned by the relay's active set.
//! The consumer keeps a handle ([`Subscription`] for streams, [`SinkHandle`] for
//! callback consumers) that holds the slot and a `Weak` reference to the relay.
//!
//! ## State machine
//! ```text
//! Active ──cancel() / drop(handle)──► Cancelled            (terminal)
//! Active ──relay teardown──────────► Cancelled + Detached (terminal)
//! ```
//!
//! ## Rules
//! - `cancel` is idempotent and callable from any thread, including from inside
//!   a consumer callback.
//! - Stream slots are fed when the relay receives a message, under the relay
//!   lock; cancel drops the sender, so the stream yields what arrived before the
//!   cancel and then ends.
//! - Consumer slots are fed by the scheduler, which checks the state before every
//!   delivery: a delivery already running completes, later ones are skipped.
//! - A detached stream (relay torn down) ends immediately; nothing buffered is observed.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::registry::RelayKey;
use super::relay::RelayCore;
use crate::consumers::Consumer;
use crate::message::Message;

/// Identifier of a subscription.
///
/// Carries the key of the relay that issued it, so ids from different relays
/// never compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId {
    relay: RelayKey,
    seq: u64,
}

impl SubscriptionId {
    pub(crate) fn new(relay: RelayKey, seq: u64) -> Self {
        Self { relay, seq }
    }

    #[inline]
    pub(crate) fn relay_key(self) -> RelayKey {
        self.relay
    }

    /// Returns the per-relay sequence number.
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.seq
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}.{}", self.relay, self.seq)
    }
}

/// Where a slot's messages go.
pub(crate) enum Target {
    /// Channel feeding a [`Subscription`] stream; taken on cancel to close it.
    Stream(Mutex<Option<mpsc::UnboundedSender<Message>>>),
    /// Callback consumer invoked on the delivery scheduler.
    Consumer(Arc<dyn Consumer>),
}

impl Target {
    pub(crate) fn stream(tx: mpsc::UnboundedSender<Message>) -> Self {
        Target::Stream(Mutex::new(Some(tx)))
    }
}

/// Delivery slot shared by the relay's active set, in-flight dispatches and the handle.
pub(crate) struct Slot {
    id: SubscriptionId,
    active: AtomicBool,
    detached: AtomicBool,
    target: Target,
}

impl Slot {
    pub(crate) fn new(id: SubscriptionId, target: Target) -> Self {
        Self {
            id,
            active: AtomicBool::new(true),
            detached: AtomicBool::new(false),
            target,
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> SubscriptionId {
        self.id
    }

    #[inline]
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Consumer name used in logs and panic events.
    pub(crate) fn name(&self) -> &'static str {
        match &self.target {
            Target::Stream(_) => "stream",
            Target::Consumer(c) => c.name(),
        }
    }

    /// Moves the slot to `Cancelled`.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub(crate) fn cancel(&self) -> bool {
        if !self.active.swap(false, Ordering::SeqCst) {
            return false;
        }
        if let Target::Stream(tx) = &self.target {
            tx.lock().take();
        }
        true
    }

    /// Cancels the slot as part of relay teardown.
    ///
    /// Unlike [`cancel`](Self::cancel), the stream also stops yielding what it
    /// had buffered.
    pub(crate) fn detach(&self) -> bool {
        self.detached.store(true, Ordering::SeqCst);
        self.cancel()
    }

    #[inline]
    fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    /// Buffers `message` in a stream slot's channel.
    ///
    /// Returns `false` for consumer slots, which are served by the scheduler.
    pub(crate) fn buffer(&self, message: &Message) -> bool {
        match &self.target {
            Target::Stream(tx) => {
                if let Some(tx) = tx.lock().as_ref() {
                    let _ = tx.send(message.clone());
                }
                true
            }
            Target::Consumer(_) => false,
        }
    }

    /// Delivers one message to a consumer slot if it is still active.
    ///
    /// A panicking consumer is caught; the payload is returned to the caller.
    pub(crate) fn deliver(&self, message: &Message) -> std::thread::Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        match &self.target {
            // already buffered by the relay
            Target::Stream(_) => Ok(()),
            Target::Consumer(consumer) => {
                catch_unwind(AssertUnwindSafe(|| consumer.on_message(message)))
            }
        }
    }
}

/// Cancels `slot`, removing it from its relay when the relay still exists.
fn cancel_slot(relay: &Weak<RelayCore>, slot: &Slot) {
    if let Some(core) = relay.upgrade() {
        core.unsubscribe(slot.id());
    }
    slot.cancel();
}

/// Stream of messages received by a relay after this subscription was created.
///
/// After [`cancel`](Self::cancel) it yields the messages that arrived before the
/// cancel, then ends. After relay teardown it ends immediately.
/// Dropping the subscription cancels it.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
    slot: Arc<Slot>,
    rx: mpsc::UnboundedReceiver<Message>,
    relay: Weak<RelayCore>,
}

impl Subscription {
    pub(crate) fn new(
        slot: Arc<Slot>,
        rx: mpsc::UnboundedReceiver<Message>,
        relay: Weak<RelayCore>,
    ) -> Self {
        Self { slot, rx, relay }
    }

    pub fn id(&self) -> SubscriptionId {
        self.slot.id()
    }

    /// Returns `true` until the subscription is cancelled.
    pub fn is_active(&self) -> bool {
        self.slot.is_active()
    }

    /// Cancels the subscription. Idempotent.
    pub fn cancel(&self) {
        cancel_slot(&self.relay, &self.slot);
    }
}

impl Stream for Subscription {
    type Item = Message;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        let this = self.get_mut();
        if this.slot.is_detached() {
            return Poll::Ready(None);
        }
        this.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        cancel_slot(&self.relay, &self.slot);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.slot.id())
            .field("active", &self.slot.is_active())
            .finish()
    }
}

/// Handle to a callback consumer attached with [`Relay::sink`](crate::Relay::sink).
///
/// Dropping the handle cancels the subscription.
#[must_use = "dropping a SinkHandle cancels the subscription"]
pub struct SinkHandle {
    slot: Arc<Slot>,
    relay: Weak<RelayCore>,
}

impl SinkHandle {
    pub(crate) fn new(slot: Arc<Slot>, relay: Weak<RelayCore>) -> Self {
        Self { slot, relay }
    }

    pub fn id(&self) -> SubscriptionId {
        self.slot.id()
    }

    /// Returns `true` until the subscription is cancelled.
    pub fn is_active(&self) -> bool {
        self.slot.is_active()
    }

    /// Cancels the subscription. Idempotent.
    pub fn cancel(&self) {
        cancel_slot(&self.relay, &self.slot);
    }
}

impl Drop for SinkHandle {
    fn drop(&mut self) {
        cancel_slot(&self.relay, &self.slot);
    }
}

impl fmt::Debug for SinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkHandle")
            .field("id", &self.slot.id())
            .field("consumer", &self.slot.name())
            .field("active", &self.slot.is_active())
            .finish()
    }
}
