//! # Relay: one native source fanned out to many subscriptions.
//!
//! A [`Relay`] owns exactly one native handle and the set of active
//! subscriptions created through it.
//!
//! ## Architecture
//! ```text
//!                 ┌───────────── Relay ─────────────┐
//! native source ──┤ bridge ──► receive(msg)         │
//! (one callback)  │             ├─ lock active set  │
//!                 │             ├─ buffer streams   ├──► Subscription channels
//!                 │             └─ enqueue Dispatch ├──► scheduler ──► consumers
//!                 │                                 │
//!                 │ subscribe() / sink() ─► add     │
//!                 │ unsubscribe(id)      ─► remove  │
//!                 └─────────────────────────────────┘
//! ```
//!
//! ## Rules
//! - **One registration**: the callback is registered once, when the relay opens.
//! - **No replay**: a subscription sees only messages received after it was added.
//! - **Total order**: buffering and enqueue happen under one lock, so every
//!   subscriber observes the relay's arrival order.
//! - **Scoped ids**: a [`SubscriptionId`] carries its relay's key; ids issued by
//!   another relay are ignored by [`Relay::unsubscribe`].
//! - **Teardown**: dropping the relay cancels every subscription, removes the
//!   relay from the registry and only then releases the native handle.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::bridge;
use super::registry::{Registry, RelayKey};
use super::scheduler::{Dispatch, Scheduler};
use super::subscription::{SinkHandle, Slot, Subscription, SubscriptionId, Target};
use crate::consumers::Consumer;
use crate::error::DecodeError;
use crate::events::{Bus, Event, EventKind};
use crate::message::Message;
use crate::native::{Context, NativeSource};

/// Mutable relay state guarded by one short-lived lock.
#[derive(Default)]
struct RelayState {
    next_id: u64,
    active: BTreeMap<SubscriptionId, Arc<Slot>>,
    closed: bool,
}

/// Shared part of a relay; reachable from the registry and subscription handles
/// through `Weak` references only.
pub(crate) struct RelayCore {
    key: RelayKey,
    service: Arc<str>,
    limit: Option<usize>,
    state: Mutex<RelayState>,
    source: Mutex<Option<Box<dyn NativeSource>>>,
    scheduler: Scheduler,
    bus: Bus,
}

impl RelayCore {
    pub(crate) fn service(&self) -> &str {
        &self.service
    }

    pub(crate) fn message_limit(&self) -> Option<usize> {
        self.limit
    }

    /// Adds an active slot for `target`.
    fn add(&self, target: Target) -> Arc<Slot> {
        let slot = {
            let mut state = self.state.lock();
            let id = SubscriptionId::new(self.key, state.next_id);
            state.next_id += 1;
            let slot = Arc::new(Slot::new(id, target));
            state.active.insert(id, Arc::clone(&slot));
            slot
        };

        tracing::debug!(relay = %self.service, subscription = %slot.id(), "subscription added");
        self.bus.publish(
            Event::new(EventKind::SubscriptionAdded)
                .with_relay(Arc::clone(&self.service))
                .with_subscription(slot.id().as_u64()),
        );
        slot
    }

    /// Fans `message` out to the subscriptions active right now.
    ///
    /// Called by the bridge on the native thread. Stream slots get the message
    /// in their channel here; consumer slots get one dispatch on the scheduler.
    pub(crate) fn receive(&self, message: Message) {
        let state = self.state.lock();
        if state.closed {
            return;
        }
        let targets: Vec<Arc<Slot>> = state
            .active
            .values()
            .filter(|slot| !slot.buffer(&message))
            .cloned()
            .collect();
        if targets.is_empty() {
            return;
        }
        self.scheduler.enqueue(Dispatch {
            relay: Arc::clone(&self.service),
            message,
            targets,
        });
    }

    /// Records a payload the bridge could not decode.
    pub(crate) fn drop_payload(&self, err: &DecodeError) {
        tracing::warn!(
            relay = %self.service,
            error = %err,
            "dropping undecodable payload"
        );
        self.bus.publish(
            Event::new(EventKind::PayloadDropped)
                .with_relay(Arc::clone(&self.service))
                .with_reason(err.as_label()),
        );
    }

    /// Cancels and removes subscription `id`. Idempotent.
    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        if id.relay_key() != self.key {
            return false;
        }
        let removed = self.state.lock().active.remove(&id);
        match removed {
            Some(slot) if slot.cancel() => {
                self.report_cancelled(id);
                true
            }
            _ => false,
        }
    }

    fn report_cancelled(&self, id: SubscriptionId) {
        tracing::debug!(relay = %self.service, subscription = %id, "subscription cancelled");
        self.bus.publish(
            Event::new(EventKind::SubscriptionCancelled)
                .with_relay(Arc::clone(&self.service))
                .with_subscription(id.as_u64()),
        );
    }
}

/// Owner of one native source and hub for its subscribers.
///
/// Created with [`Runtime::open`](crate::Runtime::open). Not `Clone`: one relay per
/// native source. Dropping it tears everything down synchronously.
///
/// Dropping also releases the native source, which may block: a
/// [`UdpBackend`](crate::native::UdpBackend) source joins its receiver thread,
/// waiting up to one `poll_interval`. Avoid dropping a relay inside a consumer
/// callback or other code running on a tokio worker; move it to
/// `tokio::task::spawn_blocking` instead.
pub struct Relay {
    core: Arc<RelayCore>,
    registry: Arc<Registry>,
}

impl Relay {
    /// Wraps `source`, registers the bridge callback and returns the relay.
    pub(crate) fn open(
        mut source: Box<dyn NativeSource>,
        registry: &Arc<Registry>,
        scheduler: Scheduler,
        bus: Bus,
        limit: Option<usize>,
    ) -> Self {
        let key = registry.reserve_key();
        let service: Arc<str> = Arc::from(source.service_name());

        let core = Arc::new(RelayCore {
            key,
            service: Arc::clone(&service),
            limit,
            state: Mutex::new(RelayState::default()),
            source: Mutex::new(None),
            scheduler,
            bus: bus.clone(),
        });

        // Registered only after the key resolves, so the first payload finds the relay.
        registry.insert(key, &core);
        let context = Context::new(key, Arc::downgrade(registry), bus.clone());
        source.register_callback(bridge::on_native_message, context);
        *core.source.lock() = Some(source);

        tracing::debug!(relay = %service, key, "relay opened");
        bus.publish(Event::new(EventKind::RelayOpened).with_relay(service));

        Self {
            core,
            registry: Arc::clone(registry),
        }
    }

    /// Returns the service name the relay was opened for.
    pub fn service_name(&self) -> &str {
        self.core.service()
    }

    /// Returns where the native source listens, if it reports it.
    pub fn endpoint(&self) -> Option<String> {
        self.core
            .source
            .lock()
            .as_ref()
            .and_then(|source| source.endpoint())
    }

    /// Creates a stream subscription.
    ///
    /// The stream yields every message received after this call returns, in
    /// arrival order, until it is cancelled or the relay is dropped.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let slot = self.core.add(Target::stream(tx));
        Subscription::new(slot, rx, Arc::downgrade(&self.core))
    }

    /// Attaches a callback consumer.
    ///
    /// `consumer` runs on the delivery scheduler, never on the native thread.
    /// Panics inside it are caught and reported as
    /// [`EventKind::SubscriberPanicked`]; the consumer stays subscribed.
    pub fn sink(&self, consumer: Arc<dyn Consumer>) -> SinkHandle {
        let slot = self.core.add(Target::Consumer(consumer));
        SinkHandle::new(slot, Arc::downgrade(&self.core))
    }

    /// Cancels subscription `id`.
    ///
    /// Returns `false` if it was already cancelled or never belonged to this relay.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.core.unsubscribe(id)
    }

    /// Returns the number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.core.state.lock().active.len()
    }

    /// Tears the relay down. Same as dropping it.
    pub fn close(self) {}
}

impl Drop for Relay {
    fn drop(&mut self) {
        let slots = {
            let mut state = self.core.state.lock();
            state.closed = true;
            std::mem::take(&mut state.active)
        };
        for (id, slot) in slots {
            if slot.detach() {
                self.core.report_cancelled(id);
            }
        }

        self.registry.remove(self.core.key);

        // The guard must be gone before the source drops: releasing it may wait
        // for a native thread that is inside `receive`.
        let source = self.core.source.lock().take();
        drop(source);

        tracing::debug!(relay = %self.core.service, "relay closed");
        self.core
            .bus
            .publish(Event::new(EventKind::RelayClosed).with_relay(Arc::clone(&self.core.service)));
    }
}

impl fmt::Debug for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("service", &self.core.service)
            .field("key", &self.core.key)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::consumers::ConsumerFn;
    use crate::core::Runtime;
    use crate::native::{Emitter, ManualBackend};
    use futures::{FutureExt, StreamExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::broadcast;

    fn open(service: &str) -> (Runtime, Relay, Emitter) {
        let backend = ManualBackend::new();
        let runtime = Runtime::builder(Config::default())
            .with_backend(backend.clone())
            .build();
        runtime.initialize().unwrap();
        let relay = runtime.open(service).unwrap();
        let emitter = backend.emitter(service).unwrap();
        (runtime, relay, emitter)
    }

    async fn next(sub: &mut Subscription) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(1), sub.next())
            .await
            .expect("no delivery within 1s")
            .map(|m| m.to_string())
    }

    async fn drain(sub: &mut Subscription) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(m) = next(sub).await {
            out.push(m);
        }
        out
    }

    async fn wait_for(mut done: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !done() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("condition not reached within 1s");
    }

    fn kinds(rx: &mut broadcast::Receiver<Event>) -> Vec<EventKind> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev.kind);
        }
        out
    }

    #[tokio::test]
    async fn test_callback_registered_once() {
        let (_rt, relay, emitter) = open("app");
        let _a = relay.subscribe();
        let _b = relay.subscribe();
        assert_eq!(emitter.registrations(), 1);
        assert_eq!(relay.endpoint().as_deref(), Some("manual:app"));
    }

    #[tokio::test]
    async fn test_late_subscriber_and_cancel_scenario() {
        let (_rt, relay, emitter) = open("app");

        let mut s1 = relay.subscribe();
        emitter.emit("a");
        let mut s2 = relay.subscribe();
        emitter.emit("b");
        s1.cancel();
        emitter.emit("c");

        assert!(!s1.is_active());
        assert_eq!(drain(&mut s1).await, vec!["a", "b"]);

        relay.unsubscribe(s2.id());
        assert_eq!(drain(&mut s2).await, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_cancel_after_delivery_keeps_received_messages() {
        let (_rt, relay, emitter) = open("app");
        let mut s1 = relay.subscribe();
        let mut s2 = relay.subscribe();

        emitter.emit("a");
        emitter.emit("b");
        assert_eq!(next(&mut s2).await.as_deref(), Some("a"));
        assert_eq!(next(&mut s2).await.as_deref(), Some("b"));

        s1.cancel();
        emitter.emit("c");
        assert_eq!(drain(&mut s1).await, vec!["a", "b"]);
        assert_eq!(next(&mut s2).await.as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn test_unsubscribe_ignores_foreign_ids() {
        let backend = ManualBackend::new();
        let runtime = Runtime::builder(Config::default())
            .with_backend(backend.clone())
            .build();
        runtime.initialize().unwrap();
        let relay_a = runtime.open("a").unwrap();
        let relay_b = runtime.open("b").unwrap();
        let sub_a = relay_a.subscribe();
        let sub_b = relay_b.subscribe();

        assert_ne!(sub_a.id(), sub_b.id());
        assert!(!relay_a.unsubscribe(sub_b.id()));
        assert!(sub_a.is_active());
        assert!(sub_b.is_active());
        assert_eq!(relay_a.subscriber_count(), 1);

        assert!(relay_b.unsubscribe(sub_b.id()));
        assert!(!sub_b.is_active());
        assert!(sub_a.is_active());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_from_another_thread_during_delivery() {
        const TOTAL: usize = 5_000;

        let (_rt, relay, emitter) = open("app");
        let relay = Arc::new(relay);
        let mut sub = relay.subscribe();
        let id = sub.id();

        let counted = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counted);
        let sink = relay.sink(ConsumerFn::arc("count", move |_m: &Message| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        let sink_id = sink.id();

        let producer = std::thread::spawn(move || {
            for i in 0..TOTAL {
                emitter.emit(i.to_string());
            }
        });
        let canceller = {
            let relay = Arc::clone(&relay);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(1));
                assert!(relay.unsubscribe(id));
                assert!(relay.unsubscribe(sink_id));
            })
        };

        let got = drain(&mut sub).await;
        assert!(got.len() <= TOTAL);
        let expected: Vec<String> = (0..got.len()).map(|i| i.to_string()).collect();
        assert_eq!(got, expected);

        producer.join().unwrap();
        canceller.join().unwrap();

        // At most one delivery can still be running when unsubscribe returns.
        let at_cancel = counted.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(counted.load(Ordering::SeqCst) <= at_cancel + 1);
        assert!(!sink.is_active());
    }

    #[tokio::test]
    async fn test_each_subscriber_sees_message_once() {
        let (_rt, relay, emitter) = open("app");
        let mut subs: Vec<Subscription> = (0..8).map(|_| relay.subscribe()).collect();
        assert_eq!(relay.subscriber_count(), 8);

        emitter.emit("x");
        for sub in &mut subs {
            assert_eq!(next(sub).await.as_deref(), Some("x"));
            assert!(sub.next().now_or_never().is_none());
        }
    }

    #[tokio::test]
    async fn test_order_is_preserved() {
        let (_rt, relay, emitter) = open("app");
        let mut sub = relay.subscribe();
        for i in 0..100 {
            emitter.emit(i.to_string());
        }
        for i in 0..100 {
            assert_eq!(next(&mut sub).await, Some(i.to_string()));
        }
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_dropped() {
        let (rt, relay, emitter) = open("app");
        let mut events = rt.events();
        let mut sub = relay.subscribe();

        emitter.emit(b"\xff\xfe");
        emitter.emit("ok");

        assert_eq!(next(&mut sub).await.as_deref(), Some("ok"));
        assert!(sub.next().now_or_never().is_none());

        let dropped: Vec<Event> = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|ev| ev.kind == EventKind::PayloadDropped)
            .collect();
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].reason.as_deref(), Some("decode_invalid_utf8"));
        assert_eq!(dropped[0].relay.as_deref(), Some("app"));
    }

    #[tokio::test]
    async fn test_message_limit_drops_long_payloads() {
        let backend = ManualBackend::new();
        let runtime = Runtime::builder(Config {
            max_message_bytes: 4,
            ..Config::default()
        })
        .with_backend(backend.clone())
        .build();
        runtime.initialize().unwrap();
        let relay = runtime.open("app").unwrap();
        let emitter = backend.emitter("app").unwrap();
        let mut sub = relay.subscribe();

        emitter.emit("too long");
        emitter.emit("fits");
        assert_eq!(next(&mut sub).await.as_deref(), Some("fits"));
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let (rt, relay, _emitter) = open("app");
        let sub = relay.subscribe();
        let other = relay.subscribe();
        let id = sub.id();
        let mut events = rt.events();

        assert!(relay.unsubscribe(id));
        assert!(!relay.unsubscribe(id));
        sub.cancel();
        drop(sub);

        assert_eq!(relay.subscriber_count(), 1);
        assert!(other.is_active());
        assert_eq!(kinds(&mut events), vec![EventKind::SubscriptionCancelled]);
    }

    #[tokio::test]
    async fn test_dropping_handle_cancels() {
        let (_rt, relay, _emitter) = open("app");
        let sub = relay.subscribe();
        let sink = relay.sink(ConsumerFn::arc("noop", |_m: &Message| {}));
        assert_eq!(relay.subscriber_count(), 2);

        drop(sub);
        drop(sink);
        assert_eq!(relay.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_teardown_cancels_and_ignores_late_callbacks() {
        let (rt, relay, emitter) = open("app");
        let mut sub = relay.subscribe();
        let sink = relay.sink(ConsumerFn::arc("noop", |_m: &Message| {}));
        emitter.emit("before");
        assert_eq!(next(&mut sub).await.as_deref(), Some("before"));
        emitter.emit("buffered, never read");

        let mut events = rt.events();
        drop(relay);

        assert!(!sub.is_active());
        assert!(!sink.is_active());
        assert!(emitter.is_released());
        assert_eq!(rt.relay_count(), 0);

        assert!(emitter.emit("after"));
        assert_eq!(next(&mut sub).await, None);

        assert_eq!(
            kinds(&mut events),
            vec![
                EventKind::SubscriptionCancelled,
                EventKind::SubscriptionCancelled,
                EventKind::RelayClosed,
                EventKind::LateCallback,
            ]
        );
    }

    #[tokio::test]
    async fn test_panicking_consumer_is_isolated() {
        let (rt, relay, emitter) = open("app");
        let mut events = rt.events();

        let calls = Arc::new(Mutex::new(0usize));
        let seen = Arc::clone(&calls);
        let _bad = relay.sink(ConsumerFn::arc("boom", move |_m: &Message| {
            *seen.lock() += 1;
            panic!("consumer failure");
        }));
        let got = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&got);
        let _good = relay.sink(ConsumerFn::arc("good", move |m: &Message| {
            sink.lock().push(m.to_string());
        }));

        emitter.emit("1");
        emitter.emit("2");
        wait_for(|| got.lock().len() == 2).await;

        assert_eq!(*got.lock(), vec!["1", "2"]);
        assert_eq!(*calls.lock(), 2);

        let panics: Vec<Event> = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|ev| ev.kind == EventKind::SubscriberPanicked)
            .collect();
        assert_eq!(panics.len(), 2);
        assert_eq!(panics[0].subscriber.as_deref(), Some("boom"));
        assert!(panics[0].is_fault());
    }

    #[tokio::test]
    async fn test_consumer_can_cancel_itself() {
        let (_rt, relay, emitter) = open("app");

        let holder: Arc<Mutex<Option<SinkHandle>>> = Arc::new(Mutex::new(None));
        let count = Arc::new(Mutex::new(0usize));
        let (h, c) = (Arc::clone(&holder), Arc::clone(&count));
        let handle = relay.sink(ConsumerFn::arc("once", move |_m: &Message| {
            *c.lock() += 1;
            let handle = h.lock().take();
            drop(handle);
        }));
        *holder.lock() = Some(handle);
        let mut witness = relay.subscribe();

        emitter.emit("first");
        emitter.emit("second");
        assert_eq!(next(&mut witness).await.as_deref(), Some("first"));
        assert_eq!(next(&mut witness).await.as_deref(), Some("second"));

        assert_eq!(*count.lock(), 1);
        assert_eq!(relay.subscriber_count(), 1);
    }
}
