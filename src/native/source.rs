//! # Native collaborator contract.
//!
//! ```text
//! Backend::global_init()            once per process, before any create
//! Backend::create(service)   ──►    Box<dyn NativeSource>   (owned by one Relay)
//! NativeSource::register_callback(callback, context)         exactly once
//!        │
//!        └─► native thread: callback(payload, &context) ... repeatedly
//! ```
//!
//! The [`Context`] handed to the source is opaque: it carries the relay's registry
//! key and a `Weak` registry handle, never a strong reference to the relay.

use std::fmt;
use std::sync::Weak;

use crate::core::{Registry, RelayKey};
use crate::events::Bus;

/// Callback signature invoked by a native source for every payload.
///
/// `payload` is only borrowed for the duration of the call; the bridge copies
/// what it needs before returning.
pub type NativeCallback = fn(payload: &[u8], context: &Context);

/// Opaque registration context passed back with every callback.
///
/// Holds no ownership of the relay it identifies.
#[derive(Clone)]
pub struct Context {
    pub(crate) key: RelayKey,
    pub(crate) registry: Weak<Registry>,
    pub(crate) bus: Bus,
}

impl Context {
    pub(crate) fn new(key: RelayKey, registry: Weak<Registry>, bus: Bus) -> Self {
        Self { key, registry, bus }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("key", &self.key).finish()
    }
}

/// Owned diagnostic text produced by the native layer alongside a failure.
///
/// The text is released exactly once, when the value is dropped or consumed
/// with [`Diagnostic::into_message`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Diagnostic {
    message: Option<String>,
}

impl Diagnostic {
    /// Creates a diagnostic carrying `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }

    /// Creates a diagnostic without text (failure status only).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Borrows the diagnostic text, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Takes ownership of the diagnostic text.
    pub fn into_message(self) -> Option<String> {
        self.message
    }

    /// Consumes the diagnostic, returning its text or `fallback`.
    pub(crate) fn into_reason(self, fallback: &str) -> String {
        self.message.unwrap_or_else(|| fallback.to_string())
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message.as_deref().unwrap_or("<no diagnostic>"))
    }
}

impl From<std::io::Error> for Diagnostic {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Factory for native sources.
///
/// ### Implementation requirements
/// - `global_init` must succeed before `create` is called; the runtime enforces it.
/// - `create` returns a source exclusively owned by the caller.
pub trait Backend: Send + Sync + 'static {
    /// Performs process-wide setup.
    fn global_init(&self) -> Result<(), Diagnostic>;

    /// Creates a source for `service_name`.
    fn create(&self, service_name: &str) -> Result<Box<dyn NativeSource>, Diagnostic>;
}

/// Per-service native handle.
///
/// Dropping the handle releases the native resources; after that the callback
/// must no longer be invoked.
pub trait NativeSource: Send + 'static {
    /// Returns the service name the source was created for.
    fn service_name(&self) -> &str;

    /// Registers the single callback for this source.
    ///
    /// Called exactly once by the owning relay. The callback may be invoked from
    /// any thread, immediately or at any later time, until the source is dropped.
    fn register_callback(&mut self, callback: NativeCallback, context: Context);

    /// Describes where the source listens (for example a socket address).
    fn endpoint(&self) -> Option<String> {
        None
    }
}
