//! # UdpBackend: datagram log server
//!
//! Each service name is a UDP port. Creating a source binds a socket on
//! [`UdpConfig::bind_ip`]; registering the callback starts one receiver thread
//! per source that reads datagrams and hands every payload to the callback.
//!
//! ## Service names
//! - `"0"` binds an ephemeral port (any number of such sources may exist).
//! - Any other name must be a port number. A port already bound by this backend
//!   is rejected instead of being shared between relays.
//!
//! ## Receiver thread
//! ```text
//! loop {
//!   ├─ stop flag set?          → exit
//!   ├─ recv_from(buf[..cap-1]) → callback(&buf[..n], &ctx)
//!   ├─ read timeout            → re-check stop flag
//!   └─ other I/O error         → warn, sleep poll_interval, continue
//! }
//! ```
//! Dropping the source sets the stop flag and joins the thread, so no callback
//! fires once the drop returns.
//!
//! The join blocks the dropping thread for up to one
//! [`poll_interval`](UdpConfig::poll_interval). Drop a relay backed by this
//! backend from `tokio::task::spawn_blocking` or a plain thread, not from a
//! consumer callback running on the delivery scheduler.

use std::collections::HashSet;
use std::io;
use std::net::{IpAddr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use super::source::{Backend, Context, Diagnostic, NativeCallback, NativeSource};

/// Settings for [`UdpBackend`].
#[derive(Clone, Debug)]
pub struct UdpConfig {
    /// Address every socket binds to.
    pub bind_ip: IpAddr,

    /// Receive buffer size in bytes; payloads are truncated to `recv_buffer - 1`.
    pub recv_buffer: usize,

    /// How often an idle receiver thread re-checks its stop flag.
    pub poll_interval: Duration,
}

impl Default for UdpConfig {
    /// Default configuration:
    ///
    /// - `bind_ip = ::` (all IPv6 interfaces)
    /// - `recv_buffer = 256`
    /// - `poll_interval = 100ms`
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            recv_buffer: 256,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Backend serving one UDP port per service name.
pub struct UdpBackend {
    cfg: UdpConfig,
    ready: AtomicBool,
    bound: Arc<Mutex<HashSet<u16>>>,
}

impl UdpBackend {
    #[must_use]
    pub fn new(cfg: UdpConfig) -> Self {
        Self {
            cfg,
            ready: AtomicBool::new(false),
            bound: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn parse_port(service_name: &str) -> Result<u16, Diagnostic> {
        service_name.parse::<u16>().map_err(|_| {
            Diagnostic::new(format!(
                "unknown service {service_name:?}: expected a port number"
            ))
        })
    }
}

impl Default for UdpBackend {
    fn default() -> Self {
        Self::new(UdpConfig::default())
    }
}

impl Backend for UdpBackend {
    fn global_init(&self) -> Result<(), Diagnostic> {
        if self.cfg.recv_buffer < 2 {
            return Err(Diagnostic::new(format!(
                "recv_buffer of {} bytes cannot hold a payload",
                self.cfg.recv_buffer
            )));
        }
        if self.cfg.poll_interval.is_zero() {
            return Err(Diagnostic::new("poll_interval must be non-zero"));
        }
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn create(&self, service_name: &str) -> Result<Box<dyn NativeSource>, Diagnostic> {
        if !self.ready.load(Ordering::SeqCst) {
            return Err(Diagnostic::new("udp backend is not initialized"));
        }
        let port = Self::parse_port(service_name)?;

        // Holding the lock across bind keeps two creates for one port from racing.
        let mut bound = self.bound.lock();
        if port != 0 && bound.contains(&port) {
            return Err(Diagnostic::new(format!("port {port} is already bound")));
        }

        let socket = UdpSocket::bind(SocketAddr::new(self.cfg.bind_ip, port))
            .map_err(|e| Diagnostic::new(format!("bind(): {e}")))?;
        socket
            .set_read_timeout(Some(self.cfg.poll_interval))
            .map_err(|e| Diagnostic::new(format!("setsockopt(): {e}")))?;
        let local_addr = socket.local_addr()?;
        bound.insert(local_addr.port());
        drop(bound);

        tracing::debug!(service = service_name, addr = %local_addr, "udp source bound");

        Ok(Box::new(UdpSource {
            service: service_name.to_string(),
            local_addr,
            socket: Some(socket),
            worker: None,
            stop: Arc::new(AtomicBool::new(false)),
            bound: Arc::clone(&self.bound),
            recv_buffer: self.cfg.recv_buffer,
            poll_interval: self.cfg.poll_interval,
        }))
    }
}

/// Source bound to one UDP socket.
struct UdpSource {
    service: String,
    local_addr: SocketAddr,
    /// Moved into the receiver thread on registration.
    socket: Option<UdpSocket>,
    worker: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    bound: Arc<Mutex<HashSet<u16>>>,
    recv_buffer: usize,
    poll_interval: Duration,
}

impl NativeSource for UdpSource {
    fn service_name(&self) -> &str {
        &self.service
    }

    fn register_callback(&mut self, callback: NativeCallback, context: Context) {
        let Some(socket) = self.socket.take() else {
            tracing::error!(service = %self.service, "second callback registration ignored");
            return;
        };

        let stop = Arc::clone(&self.stop);
        let cap = self.recv_buffer;
        let idle = self.poll_interval;
        let service = self.service.clone();

        let spawned = std::thread::Builder::new()
            .name(format!("netlog-udp-{}", self.local_addr.port()))
            .spawn(move || receive_loop(socket, callback, context, stop, cap, idle, service));

        match spawned {
            Ok(handle) => self.worker = Some(handle),
            Err(e) => {
                tracing::error!(service = %self.service, error = %e, "cannot spawn receiver thread")
            }
        }
    }

    fn endpoint(&self) -> Option<String> {
        Some(self.local_addr.to_string())
    }
}

impl Drop for UdpSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.bound.lock().remove(&self.local_addr.port());
        tracing::debug!(service = %self.service, "udp source released");
    }
}

fn receive_loop(
    socket: UdpSocket,
    callback: NativeCallback,
    context: Context,
    stop: Arc<AtomicBool>,
    cap: usize,
    idle: Duration,
    service: String,
) {
    let mut buf = vec![0u8; cap];

    while !stop.load(Ordering::SeqCst) {
        match socket.recv_from(&mut buf[..cap - 1]) {
            Ok((n, _peer)) => callback(&buf[..n], &context),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                tracing::warn!(service = %service, error = %e, "recv_from failed");
                std::thread::sleep(idle);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn loopback() -> UdpBackend {
        UdpBackend::new(UdpConfig {
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            poll_interval: Duration::from_millis(20),
            ..UdpConfig::default()
        })
    }

    #[test]
    fn test_create_requires_init() {
        let backend = loopback();
        let err = backend.create("0").err().unwrap();
        assert_eq!(err.message(), Some("udp backend is not initialized"));
    }

    #[test]
    fn test_rejects_non_numeric_service() {
        let backend = loopback();
        backend.global_init().unwrap();
        assert!(backend.create("syslog").is_err());
    }

    #[test]
    fn test_invalid_config_fails_init() {
        let backend = UdpBackend::new(UdpConfig {
            recv_buffer: 1,
            ..UdpConfig::default()
        });
        assert!(backend.global_init().is_err());
    }

    #[test]
    fn test_port_is_exclusive_until_released() {
        let backend = loopback();
        backend.global_init().unwrap();

        let first = backend.create("0").unwrap();
        let addr: SocketAddr = first.endpoint().unwrap().parse().unwrap();
        let service = addr.port().to_string();

        assert!(backend.create(&service).is_err());
        drop(first);
        assert!(backend.create(&service).is_ok());
    }

    #[test]
    fn test_ephemeral_services_coexist() {
        let backend = loopback();
        backend.global_init().unwrap();
        let a = backend.create("0").unwrap();
        let b = backend.create("0").unwrap();
        assert_ne!(a.endpoint(), b.endpoint());
    }
}
