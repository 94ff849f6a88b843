//! # Runtime: process-level context for every relay.
//!
//! The [`Runtime`] owns the native [`Backend`], the cached initialization result,
//! the relay registry, the delivery scheduler and the diagnostics bus.
//!
//! ## Lifecycle
//! ```text
//! Runtime::builder(cfg).build()      spawns the scheduler task
//!        │
//! initialize()                       Backend::global_init() once; result cached
//!        │                             ├─ Ok  → RuntimeInitialized
//!        │                             └─ Err → InitializationFailed (never retried)
//!        ▼
//! open(service) ──► Backend::create ──► Relay::open ──► Relay
//!        │
//! shutdown().await                   cancel scheduler, await its task
//!                                      └─► SchedulerStopped
//! ```
//!
//! ## Rules
//! - `initialize` is idempotent and safe to call from several threads; the backend
//!   sees exactly one `global_init`.
//! - `open` fails with [`RelayError::NotInitialized`] before a successful
//!   `initialize`, with the cached [`RelayError::Initialization`] after a failed one,
//!   and with [`RelayError::ShutDown`] after `shutdown`.
//! - Dropping the last runtime handle stops the scheduler; relays still open then
//!   drop every message bound for a callback consumer with `DeliveryDropped`.

use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::builder::RuntimeBuilder;
use super::registry::Registry;
use super::relay::Relay;
use super::scheduler::Scheduler;
use crate::config::Config;
use crate::error::RelayError;
use crate::events::{Bus, Event, EventKind};
use crate::native::Backend;

pub(crate) struct RuntimeInner {
    pub(crate) cfg: Config,
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) init: OnceLock<Result<(), RelayError>>,
    pub(crate) registry: Arc<Registry>,
    pub(crate) scheduler: Scheduler,
    pub(crate) bus: Bus,
    pub(crate) token: CancellationToken,
    pub(crate) worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for RuntimeInner {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Entry point of the relay: initializes the native layer and opens relays.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Creates a builder for constructing a runtime.
    ///
    /// ## Example
    /// ```rust
    /// use netlog_relay::{Config, Runtime};
    /// use netlog_relay::native::ManualBackend;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), netlog_relay::RelayError> {
    /// let runtime = Runtime::builder(Config::default())
    ///     .with_backend(ManualBackend::new())
    ///     .build();
    /// runtime.initialize()?;
    /// let relay = runtime.open("app")?;
    /// assert_eq!(relay.service_name(), "app");
    /// # Ok(())
    /// # }
    /// ```
    pub fn builder(cfg: Config) -> RuntimeBuilder {
        RuntimeBuilder::new(cfg)
    }

    pub(crate) fn from_inner(inner: RuntimeInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Performs process-wide native setup.
    ///
    /// The first call runs [`Backend::global_init`]; every later call returns the
    /// cached outcome.
    pub fn initialize(&self) -> Result<(), RelayError> {
        self.inner.init.get_or_init(|| self.global_init()).clone()
    }

    fn global_init(&self) -> Result<(), RelayError> {
        match self.inner.backend.global_init() {
            Ok(()) => {
                tracing::debug!("native layer initialized");
                self.inner
                    .bus
                    .publish(Event::new(EventKind::RuntimeInitialized));
                Ok(())
            }
            Err(diagnostic) => {
                let reason = diagnostic.into_reason("global initialization failed");
                tracing::error!(reason = %reason, "native initialization failed");
                self.inner.bus.publish(
                    Event::new(EventKind::InitializationFailed).with_reason(reason.as_str()),
                );
                Err(RelayError::Initialization { reason })
            }
        }
    }

    /// Returns `true` once [`initialize`](Self::initialize) has succeeded.
    pub fn is_initialized(&self) -> bool {
        matches!(self.inner.init.get(), Some(Ok(())))
    }

    /// Opens a relay for `service`.
    ///
    /// Creates the native handle, registers the callback bridge with it and
    /// returns the relay that owns it.
    pub fn open(&self, service: &str) -> Result<Relay, RelayError> {
        if self.inner.token.is_cancelled() {
            return Err(RelayError::ShutDown);
        }
        match self.inner.init.get() {
            None => return Err(RelayError::NotInitialized),
            Some(Err(err)) => return Err(err.clone()),
            Some(Ok(())) => {}
        }

        let source = self.inner.backend.create(service).map_err(|diagnostic| {
            let reason = diagnostic.into_reason("handle creation failed");
            tracing::warn!(service, reason = %reason, "cannot open relay");
            RelayError::Registration {
                service: service.to_string(),
                reason,
            }
        })?;

        Ok(Relay::open(
            source,
            &self.inner.registry,
            self.inner.scheduler.clone(),
            self.inner.bus.clone(),
            self.inner.cfg.message_limit(),
        ))
    }

    /// Opens a relay for [`Config::default_service`].
    pub fn open_default(&self) -> Result<Relay, RelayError> {
        self.open(&self.inner.cfg.default_service)
    }

    /// Returns a receiver of runtime diagnostics events.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.inner.bus.subscribe()
    }

    pub fn config(&self) -> &Config {
        &self.inner.cfg
    }

    /// Returns the number of relays currently open.
    pub fn relay_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Returns sorted service names of the relays currently open.
    pub fn services(&self) -> Vec<String> {
        self.inner.registry.services()
    }

    /// Stops the delivery scheduler and waits for its task to finish.
    ///
    /// Consumer deliveries still queued are discarded and later ones are dropped
    /// with `DeliveryDropped`. Stream subscriptions are read on the caller's tasks
    /// and keep working until cancelled. Later [`open`](Self::open) calls fail with
    /// [`RelayError::ShutDown`].
    pub async fn shutdown(&self) {
        self.inner.token.cancel();
        let worker = self.inner.worker.lock().take();
        let Some(worker) = worker else {
            return;
        };

        if let Err(e) = worker.await {
            tracing::warn!(error = %e, "delivery scheduler task failed");
        }
        self.inner
            .bus
            .publish(Event::new(EventKind::SchedulerStopped));
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("initialized", &self.is_initialized())
            .field("relays", &self.relay_count())
            .field("shut_down", &self.inner.token.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumers::ConsumerFn;
    use crate::message::Message;
    use crate::native::ManualBackend;
    use futures::StreamExt;

    fn manual() -> (Runtime, ManualBackend) {
        let backend = ManualBackend::new();
        let runtime = Runtime::builder(Config::default())
            .with_backend(backend.clone())
            .build();
        (runtime, backend)
    }

    fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<EventKind> {
        let mut kinds = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            kinds.push(ev.kind);
        }
        kinds
    }

    #[tokio::test]
    async fn test_open_requires_initialize() {
        let (runtime, _backend) = manual();
        assert!(!runtime.is_initialized());
        assert_eq!(runtime.open("app").unwrap_err(), RelayError::NotInitialized);
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let (runtime, backend) = manual();
        let mut events = runtime.events();

        runtime.initialize().unwrap();
        runtime.initialize().unwrap();
        runtime.clone().initialize().unwrap();

        assert_eq!(backend.init_calls(), 1);
        assert!(runtime.is_initialized());
        assert_eq!(drain(&mut events), vec![EventKind::RuntimeInitialized]);
    }

    #[tokio::test]
    async fn test_failed_initialize_is_cached() {
        let backend = ManualBackend::new().with_init_failure("no entropy");
        let runtime = Runtime::builder(Config::default())
            .with_backend(backend.clone())
            .build();
        let mut events = runtime.events();

        let first = runtime.initialize().unwrap_err();
        assert_eq!(
            first,
            RelayError::Initialization {
                reason: "no entropy".into()
            }
        );
        assert_eq!(runtime.initialize().unwrap_err(), first);
        assert_eq!(runtime.open("app").unwrap_err(), first);
        assert_eq!(backend.init_calls(), 1);
        assert!(backend.emitter("app").is_none());
        assert_eq!(drain(&mut events), vec![EventKind::InitializationFailed]);
    }

    #[tokio::test]
    async fn test_registration_failure_names_service() {
        let (runtime, backend) = manual();
        runtime.initialize().unwrap();
        backend.reject_service("514");

        match runtime.open("514").unwrap_err() {
            RelayError::Registration { service, reason } => {
                assert_eq!(service, "514");
                assert!(reason.contains("rejected"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(runtime.relay_count(), 0);
    }

    #[tokio::test]
    async fn test_open_tracks_relays() {
        let (runtime, _backend) = manual();
        runtime.initialize().unwrap();

        let b = runtime.open("beta").unwrap();
        let a = runtime.open("alpha").unwrap();
        let d = runtime.open_default().unwrap();
        assert_eq!(d.service_name(), "0");
        assert_eq!(runtime.relay_count(), 3);
        assert_eq!(runtime.services(), vec!["0", "alpha", "beta"]);

        drop(b);
        a.close();
        assert_eq!(runtime.services(), vec!["0"]);
    }

    #[tokio::test]
    async fn test_zero_bus_capacity_still_reports_events() {
        let runtime = Runtime::builder(Config {
            bus_capacity: 0,
            ..Config::default()
        })
        .with_backend(ManualBackend::new())
        .build();
        let mut events = runtime.events();

        runtime.initialize().unwrap();
        assert_eq!(drain(&mut events), vec![EventKind::RuntimeInitialized]);
    }

    #[tokio::test]
    async fn test_shutdown_stops_delivery_and_open() {
        let (runtime, backend) = manual();
        runtime.initialize().unwrap();
        let relay = runtime.open("app").unwrap();
        let _sink = relay.sink(ConsumerFn::arc("noop", |_m: &Message| {}));
        let mut stream = relay.subscribe();
        let mut events = runtime.events();

        runtime.shutdown().await;
        runtime.shutdown().await;

        assert_eq!(runtime.open("other").unwrap_err(), RelayError::ShutDown);
        assert!(backend.emitter("app").unwrap().emit("after"));

        let kinds = drain(&mut events);
        assert_eq!(
            kinds,
            vec![EventKind::SchedulerStopped, EventKind::DeliveryDropped]
        );
        assert_eq!(stream.next().await.as_deref(), Some("after"));
    }

    #[cfg(feature = "udp")]
    #[tokio::test]
    async fn test_udp_datagram_reaches_subscriber() {
        use crate::native::{UdpBackend, UdpConfig};
        use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
        use std::time::Duration;

        let backend = UdpBackend::new(UdpConfig {
            bind_ip: Ipv4Addr::LOCALHOST.into(),
            poll_interval: Duration::from_millis(20),
            ..UdpConfig::default()
        });
        let runtime = Runtime::builder(Config::default())
            .with_backend(backend)
            .build();
        runtime.initialize().unwrap();

        let relay = runtime.open_default().unwrap();
        let mut sub = relay.subscribe();
        let addr: SocketAddr = relay.endpoint().unwrap().parse().unwrap();

        let client = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        client.send_to(b"<13>hello over udp", addr).unwrap();

        let got = tokio::time::timeout(Duration::from_secs(2), sub.next())
            .await
            .expect("datagram not delivered");
        assert_eq!(got.as_deref(), Some("<13>hello over udp"));

        drop(relay);
        assert_eq!(sub.next().await, None);
    }
}
