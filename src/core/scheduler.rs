//! # Delivery scheduler: the single context on which callback consumers run.
//!
//! Native callback threads never run subscriber code. [`Relay::receive`](super::relay::RelayCore::receive)
//! buffers the message for stream subscriptions (read later on the reader's own
//! task) and enqueues a [`Dispatch`] for the consumer slots; one tokio task drains
//! the queue and invokes the consumers.
//!
//! ## Architecture
//! ```text
//! native thread(s)                       scheduler task (one per Runtime)
//!   receive(msg) ── enqueue(Dispatch) ──► [unbounded FIFO] ──► dispatch.run()
//!   (returns immediately)                                        ├─► slot 1 deliver
//!                                                                ├─► slot 2 deliver ─► panic caught
//!                                                                └─► slot N deliver
//! ```
//!
//! ## Rules
//! - **FIFO**: dispatches run in enqueue order, so per-relay order is preserved.
//! - **Non-reentrant**: deliveries are serialized; a consumer never runs concurrently
//!   with itself.
//! - **Isolation**: a panicking consumer is reported as `SubscriberPanicked`; the
//!   remaining slots of the same dispatch are still served.
//! - **Non-blocking enqueue**: the queue is unbounded (no backpressure).

use std::any::Any;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::subscription::Slot;
use crate::events::{Bus, Event, EventKind};
use crate::message::Message;

/// One message bound for a snapshot of a relay's active consumers.
pub(crate) struct Dispatch {
    pub(crate) relay: Arc<str>,
    pub(crate) message: Message,
    pub(crate) targets: Vec<Arc<Slot>>,
}

impl Dispatch {
    /// Delivers to every target that is still active.
    fn run(self, bus: &Bus) {
        for slot in &self.targets {
            if let Err(panic) = slot.deliver(&self.message) {
                let info = panic_message(&*panic);
                tracing::warn!(
                    relay = %self.relay,
                    subscription = %slot.id(),
                    subscriber = slot.name(),
                    panic = %info,
                    "consumer panicked; continuing with remaining subscribers"
                );
                bus.publish(Event::subscriber_panicked(
                    Arc::clone(&self.relay),
                    slot.id().as_u64(),
                    slot.name(),
                    info,
                ));
            }
        }
    }
}

/// Extracts a readable message from a panic payload.
fn panic_message(any: &(dyn Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Enqueue side of the delivery scheduler. Cheap to clone.
#[derive(Clone)]
pub(crate) struct Scheduler {
    tx: mpsc::UnboundedSender<Dispatch>,
    bus: Bus,
}

impl Scheduler {
    /// Spawns the scheduler task on the current tokio runtime.
    ///
    /// The task exits when `token` is cancelled or every sender is gone.
    pub(crate) fn spawn(bus: Bus, token: CancellationToken) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Dispatch>();
        let bus_for_worker = bus.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    job = rx.recv() => match job {
                        Some(job) => job.run(&bus_for_worker),
                        None => break,
                    }
                }
            }
            tracing::debug!("delivery scheduler stopped");
        });

        (Self { tx, bus }, handle)
    }

    /// Queues `job` for delivery. Never blocks.
    pub(crate) fn enqueue(&self, job: Dispatch) {
        if let Err(mpsc::error::SendError(job)) = self.tx.send(job) {
            tracing::warn!(relay = %job.relay, "delivery scheduler stopped; message dropped");
            self.bus
                .publish(Event::new(EventKind::DeliveryDropped).with_relay(job.relay));
        }
    }
}
