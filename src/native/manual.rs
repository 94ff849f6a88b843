//! # ManualBackend: hand-driven native source
//!
//! An in-process [`Backend`] whose sources never produce anything on their own.
//! Payloads are pushed through an [`Emitter`], synchronously, on whatever thread
//! calls [`Emitter::emit`]. That thread plays the role of the native callback
//! thread.
//!
//! Useful for tests and for embedding the relay in front of a producer that is
//! not a real native component.
//!
//! ## Behavior
//! - Init can be made to fail with [`ManualBackend::with_init_failure`].
//! - Individual services can be rejected with [`ManualBackend::reject_service`].
//! - An emitter keeps working after its source was dropped, so callers can
//!   reproduce a native layer that violates the "no callback after release" rule.
//!
//! ## Example
//! ```rust
//! use netlog_relay::native::{Backend, ManualBackend};
//!
//! let backend = ManualBackend::new();
//! backend.global_init().unwrap();
//! let _source = backend.create("1979").unwrap();
//!
//! let emitter = backend.emitter("1979").unwrap();
//! assert_eq!(emitter.registrations(), 0);
//! assert!(!emitter.emit("nobody is listening yet"));
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::source::{Backend, Context, Diagnostic, NativeCallback, NativeSource};

/// State shared between one source and its emitters.
#[derive(Default)]
struct Channel {
    registration: Mutex<Option<(NativeCallback, Context)>>,
    registrations: AtomicUsize,
    released: AtomicBool,
}

#[derive(Default)]
struct Shared {
    init_failure: Mutex<Option<String>>,
    init_calls: AtomicUsize,
    rejected: Mutex<HashSet<String>>,
    channels: Mutex<HashMap<String, Arc<Channel>>>,
}

/// Backend whose sources are driven by [`Emitter`]s.
///
/// Cloning yields another handle to the same backend.
#[derive(Clone, Default)]
pub struct ManualBackend {
    shared: Arc<Shared>,
}

impl ManualBackend {
    /// Creates a backend whose initialization succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `global_init` call fail with `reason`.
    #[must_use]
    pub fn with_init_failure(self, reason: impl Into<String>) -> Self {
        *self.shared.init_failure.lock() = Some(reason.into());
        self
    }

    /// Makes `create` fail for `service_name`.
    pub fn reject_service(&self, service_name: impl Into<String>) {
        self.shared.rejected.lock().insert(service_name.into());
    }

    /// Returns how many times `global_init` was called.
    pub fn init_calls(&self) -> usize {
        self.shared.init_calls.load(Ordering::SeqCst)
    }

    /// Returns an emitter for the most recently created source of `service_name`.
    pub fn emitter(&self, service_name: &str) -> Option<Emitter> {
        self.shared
            .channels
            .lock()
            .get(service_name)
            .map(|channel| Emitter {
                channel: Arc::clone(channel),
            })
    }
}

impl Backend for ManualBackend {
    fn global_init(&self) -> Result<(), Diagnostic> {
        self.shared.init_calls.fetch_add(1, Ordering::SeqCst);
        match self.shared.init_failure.lock().as_ref() {
            Some(reason) => Err(Diagnostic::new(reason.clone())),
            None => Ok(()),
        }
    }

    fn create(&self, service_name: &str) -> Result<Box<dyn NativeSource>, Diagnostic> {
        if self.shared.rejected.lock().contains(service_name) {
            return Err(Diagnostic::new(format!(
                "service {service_name:?} rejected"
            )));
        }

        let channel = Arc::new(Channel::default());
        self.shared
            .channels
            .lock()
            .insert(service_name.to_string(), Arc::clone(&channel));

        Ok(Box::new(ManualSource {
            service: service_name.to_string(),
            channel,
        }))
    }
}

/// Source created by [`ManualBackend`].
struct ManualSource {
    service: String,
    channel: Arc<Channel>,
}

impl NativeSource for ManualSource {
    fn service_name(&self) -> &str {
        &self.service
    }

    fn register_callback(&mut self, callback: NativeCallback, context: Context) {
        let previous = self.channel.registrations.fetch_add(1, Ordering::SeqCst);
        if previous > 0 {
            tracing::error!(
                service = %self.service,
                "second callback registration ignored"
            );
            return;
        }
        *self.channel.registration.lock() = Some((callback, context));
    }

    fn endpoint(&self) -> Option<String> {
        Some(format!("manual:{}", self.service))
    }
}

impl Drop for ManualSource {
    fn drop(&mut self) {
        self.channel.released.store(true, Ordering::SeqCst);
    }
}

/// Pushes payloads into a [`ManualBackend`] source.
#[derive(Clone)]
pub struct Emitter {
    channel: Arc<Channel>,
}

impl Emitter {
    /// Invokes the registered callback with `payload` on the calling thread.
    ///
    /// Returns `false` when no callback has been registered yet.
    pub fn emit(&self, payload: impl AsRef<[u8]>) -> bool {
        let registration = self.channel.registration.lock().clone();
        match registration {
            Some((callback, context)) => {
                callback(payload.as_ref(), &context);
                true
            }
            None => false,
        }
    }

    /// Returns how many times `register_callback` was called on the source.
    pub fn registrations(&self) -> usize {
        self.channel.registrations.load(Ordering::SeqCst)
    }

    /// Returns `true` once the owning relay released the source.
    pub fn is_released(&self) -> bool {
        self.channel.released.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_failure_is_reported_every_call() {
        let backend = ManualBackend::new().with_init_failure("kqueue(): no memory");
        let err = backend.global_init().unwrap_err();
        assert_eq!(err.message(), Some("kqueue(): no memory"));
        assert!(backend.global_init().is_err());
        assert_eq!(backend.init_calls(), 2);
    }

    #[test]
    fn test_rejected_service() {
        let backend = ManualBackend::new();
        backend.reject_service("1980");
        assert!(backend.create("1980").is_err());
        assert!(backend.create("1979").is_ok());
        assert!(backend.emitter("1980").is_none());
    }

    #[test]
    fn test_drop_marks_released() {
        let backend = ManualBackend::new();
        let source = backend.create("0").unwrap();
        let emitter = backend.emitter("0").unwrap();
        assert!(!emitter.is_released());
        drop(source);
        assert!(emitter.is_released());
    }
}
