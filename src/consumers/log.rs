//! # Logging consumer for debugging and demos.
//!
//! [`LogWriter`] forwards every message to `tracing` at `info` level.
//!
//! ## Output format
//! ```text
//! INFO netlog_relay::consumers::log: message text="kernel: eth0 up" len=15
//! ```
//!
//! ## Example
//! ```no_run
//! # use std::sync::Arc;
//! # use netlog_relay::{Config, LogWriter, Runtime};
//! # async fn demo() -> Result<(), netlog_relay::RelayError> {
//! let runtime = Runtime::builder(Config::default()).build();
//! runtime.initialize()?;
//! let relay = runtime.open_default()?;
//! let _handle = relay.sink(Arc::new(LogWriter));
//! # Ok(())
//! # }
//! ```

use super::Consumer;
use crate::message::Message;

/// Consumer that logs each message through `tracing`.
///
/// Enabled via the `logging` feature. Not intended for production use -
/// implement a custom [`Consumer`] for real processing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogWriter;

impl Consumer for LogWriter {
    fn on_message(&self, message: &Message) {
        tracing::info!(text = %message, len = message.len(), "message");
    }

    fn name(&self) -> &'static str {
        "log_writer"
    }
}
