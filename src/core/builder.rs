use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::registry::Registry;
use super::runtime::{Runtime, RuntimeInner};
use super::scheduler::Scheduler;
use crate::{config::Config, events::Bus, native::Backend};

/// Builder for constructing a [`Runtime`] with a chosen native backend.
pub struct RuntimeBuilder {
    cfg: Config,
    backend: Option<Arc<dyn Backend>>,
}

impl RuntimeBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self { cfg, backend: None }
    }

    /// Sets the native backend relays are created from.
    ///
    /// Defaults to [`UdpBackend`](crate::native::UdpBackend) with the `udp`
    /// feature, otherwise to [`ManualBackend`](crate::native::ManualBackend).
    pub fn with_backend(mut self, backend: impl Backend) -> Self {
        let backend: Arc<dyn Backend> = Arc::new(backend);
        self.backend = Some(backend);
        self
    }

    /// Builds and returns the Runtime instance.
    ///
    /// This consumes the builder and initializes the runtime components:
    /// - Diagnostics bus
    /// - Relay registry
    /// - Delivery scheduler task
    ///
    /// Native initialization is not performed here; call [`Runtime::initialize`].
    ///
    /// # Panics
    /// Panics if called outside of a tokio runtime (the scheduler task is spawned here).
    pub fn build(self) -> Runtime {
        let bus = Bus::new(self.cfg.bus_capacity);
        let token = CancellationToken::new();
        let (scheduler, worker) = Scheduler::spawn(bus.clone(), token.clone());
        let backend = self.backend.unwrap_or_else(default_backend);

        Runtime::from_inner(RuntimeInner {
            cfg: self.cfg,
            backend,
            init: OnceLock::new(),
            registry: Registry::new(),
            scheduler,
            bus,
            token,
            worker: Mutex::new(Some(worker)),
        })
    }
}

#[cfg(feature = "udp")]
fn default_backend() -> Arc<dyn Backend> {
    Arc::new(crate::native::UdpBackend::default())
}

#[cfg(not(feature = "udp"))]
fn default_backend() -> Arc<dyn Backend> {
    Arc::new(crate::native::ManualBackend::new())
}
