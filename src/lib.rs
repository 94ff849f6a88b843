//! # netlog-relay
//!
//! **netlog-relay** turns a callback-driven native event source into a
//! multi-subscriber message stream.
//!
//! A native component (a syslog-style UDP server, a driver, an FFI library)
//! accepts exactly one callback and calls it from its own threads. This crate
//! registers that callback once per source and fans every message out to any
//! number of independent, cancellable subscribers.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ NativeSource │   │ NativeSource │   │ NativeSource │
//!     │  (udp:514)   │   │  (udp:0)     │   │  (manual)    │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            │ callback(payload, ctx) on native threads
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  CallbackBridge                                                   │
//! │  - Registry lookup (ctx key → Weak<Relay>)                        │
//! │  - decode (NUL-terminated, UTF-8, optional length limit)          │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │    Relay     │   │    Relay     │   │    Relay     │
//!     │  active set  │   │  active set  │   │  active set  │
//!     └──┬───────┬───┘   └──────┬───────┘   └──────┬───────┘
//!        │       └──── enqueue(Dispatch) ──────────┘
//!        │ buffer               ▼
//!        ▼        ┌────────────────────────────┐
//!   Subscription  │ DeliveryScheduler (1 task) │
//!    (Stream)     └─────┬────────┬────────┬────┘
//!                       ▼        ▼        ▼
//!                   SinkHandle (Consumer) ...
//! ```
//!
//! ### Lifecycle
//! ```text
//! Runtime::builder(cfg).build() ──► initialize() ──► open(service) ──► Relay
//!
//! Relay:
//!   ├─► subscribe() / sink()   add Active subscription (no replay)
//!   ├─► native callback        decode → buffer streams, enqueue consumers
//!   ├─► cancel / drop handle   Active → Cancelled (idempotent; streams drain)
//!   └─► drop / close()         cancel all → unregister → release native handle
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                        |
//! |-------------------|--------------------------------------------------------------|-------------------------------------------|
//! | **Runtime**       | Native initialization, relay creation, shutdown.             | [`Runtime`], [`RuntimeBuilder`]           |
//! | **Relays**        | One native source fanned out to many subscribers.            | [`Relay`]                                 |
//! | **Subscriptions** | Streams and callback consumers, cancellable at any time.     | [`Subscription`], [`SinkHandle`], [`Consumer`] |
//! | **Native layer**  | Backend contract plus UDP and manual implementations.        | [`native::Backend`], [`native::NativeSource`] |
//! | **Diagnostics**   | Structured runtime events next to `tracing` logs.            | [`Event`], [`EventKind`]                  |
//! | **Errors**        | Typed errors for setup and payload decoding.                 | [`RelayError`], [`DecodeError`]           |
//! | **Configuration** | Centralize runtime settings.                                 | [`Config`]                                |
//!
//! ## Optional features
//! - `udp` _(default)_: exports [`native::UdpBackend`], the default backend.
//! - `logging`: exports a simple built-in [`LogWriter`] consumer _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use futures::StreamExt;
//! use netlog_relay::{Config, Runtime};
//! use netlog_relay::native::ManualBackend;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = ManualBackend::new();
//!     let runtime = Runtime::builder(Config::default())
//!         .with_backend(backend.clone())
//!         .build();
//!     runtime.initialize()?;
//!
//!     let relay = runtime.open("app")?;
//!     let mut lines = relay.subscribe().map(|m| m.to_uppercase());
//!
//!     // Plays the native thread.
//!     let emitter = backend.emitter("app").expect("source exists");
//!     emitter.emit("hello");
//!
//!     assert_eq!(lines.next().await.as_deref(), Some("HELLO"));
//!     Ok(())
//! }
//! ```

mod config;
mod consumers;
mod core;
mod error;
mod events;
mod message;

pub mod native;

// ---- Public re-exports ----

pub use config::Config;
pub use consumers::{Consumer, ConsumerFn};
pub use crate::core::{Relay, Runtime, RuntimeBuilder, SinkHandle, Subscription, SubscriptionId};
pub use error::{DecodeError, RelayError};
pub use events::{Bus, Event, EventKind};
pub use message::Message;

// Optional: expose a simple built-in logging consumer.
#[cfg(feature = "logging")]
pub use consumers::LogWriter;
