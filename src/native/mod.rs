//! Native event sources: the collaborator contract and its implementations.
//!
//! The relay core never produces messages itself. It talks to a [`Backend`],
//! which performs process-wide setup and creates one [`NativeSource`] per service
//! name. Each source accepts exactly one callback registration and invokes it
//! from a thread it controls.
//!
//! ## Contents
//! - [`Backend`], [`NativeSource`], [`NativeCallback`], [`Context`], [`Diagnostic`]: the contract
//! - [`ManualBackend`], [`Emitter`]: in-process source driven by hand (tests, embedding)
//! - [`UdpBackend`], [`UdpConfig`]: datagram log server, one UDP port per service
//!   _(feature `udp`, on by default)_
//!
//! ## Caller contract
//! - `register_callback` is called once per source by the relay that owns it.
//!   A second call is a contract violation; implementations log and ignore it.
//! - A source must stop invoking its callback once it is dropped. Invocations that
//!   still race with relay teardown are tolerated by the bridge and reported as
//!   [`EventKind::LateCallback`](crate::EventKind::LateCallback), never delivered.

mod manual;
mod source;
#[cfg(feature = "udp")]
mod udp;

pub use manual::{Emitter, ManualBackend};
pub use source::{Backend, Context, Diagnostic, NativeCallback, NativeSource};
#[cfg(feature = "udp")]
pub use udp::{UdpBackend, UdpConfig};
