//! Runtime diagnostics: event types and broadcast bus.
//!
//! This module groups the diagnostics **data model** and the **bus** used to
//! observe what the relay runtime is doing without touching the message path.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Runtime` (initialization), `Relay` (open/close, subscribe/cancel),
//!   the callback bridge (dropped payloads, late callbacks) and the delivery
//!   scheduler (subscriber panics, deliveries after shutdown).
//! - **Consumers**: anything holding a receiver from [`Runtime::events`](crate::Runtime::events).
//!
//! Events are diagnostics only. Relay messages never travel over this bus.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
