//! Relay core: bridging, fan-out and delivery.
//!
//! This module contains the embedded implementation of the relay runtime.
//! The public API from this module is [`Runtime`] (with [`RuntimeBuilder`]),
//! [`Relay`] and the subscription handles.
//!
//! Internal modules:
//! - [`runtime`]: initialization state, relay creation, shutdown;
//! - [`relay`]: owns one native source and its active subscription set;
//! - [`bridge`]: the callback every native source invokes;
//! - [`scheduler`]: the single task on which deliveries happen;
//! - [`subscription`]: delivery slots, stream and sink handles;
//! - [`registry`]: maps callback contexts to live relays.

mod bridge;
mod builder;
mod registry;
mod relay;
mod runtime;
mod scheduler;
mod subscription;

pub(crate) use registry::{Registry, RelayKey};

pub use builder::RuntimeBuilder;
pub use relay::Relay;
pub use runtime::Runtime;
pub use subscription::{SinkHandle, Subscription, SubscriptionId};
