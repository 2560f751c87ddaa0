//! Transport abstraction
//!
//! A non-blocking byte pipe. Readiness callbacks (`on_connect`,
//! `on_readable`, `on_writable`, `on_error`) travel the other way, from the
//! reactor into the service.

use std::io;

use crate::client::Role;
use crate::config::BackendConfig;

/// Result of starting a connect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
    /// The socket is usable right away
    Connected,

    /// The reactor will report completion through `on_connect`
    InProgress,
}

/// One socket, owned by exactly one connection
pub trait Transport {
    /// Start connecting to `host:port`
    fn connect(&mut self, host: &str, port: u16) -> io::Result<ConnectStatus>;

    /// Write as many bytes as the socket accepts right now
    ///
    /// Returns `ErrorKind::WouldBlock` when nothing can be written.
    fn send(&mut self, bytes: &[u8]) -> io::Result<usize>;

    /// Read whatever is available; `Ok(0)` means the peer closed
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Switch between blocking and non-blocking mode
    fn set_blocking(&mut self, blocking: bool) -> io::Result<()>;

    /// Release the socket
    fn close(&mut self) {}
}

/// Creates transports for (re)connecting backends
pub trait TransportFactory {
    fn create(&self, backend: &BackendConfig, role: Role) -> Box<dyn Transport>;
}

impl<F> TransportFactory for F
where
    F: Fn(&BackendConfig, Role) -> Box<dyn Transport>,
{
    fn create(&self, backend: &BackendConfig, role: Role) -> Box<dyn Transport> {
        self(backend, role)
    }
}
