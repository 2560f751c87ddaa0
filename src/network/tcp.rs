//! TCP transport
//!
//! `std::net::TcpStream` in non-blocking mode. Connecting is synchronous
//! (bounded by the connect timeout), everything else never blocks unless
//! the client asks for a blocking drain.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::{ConnectStatus, Transport, TransportFactory};
use crate::client::Role;
use crate::config::{BackendConfig, Config};

/// Non-blocking TCP socket
pub struct TcpTransport {
    stream: Option<TcpStream>,
    connect_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration, read_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            stream: None,
            connect_timeout,
            read_timeout,
            write_timeout,
        }
    }

    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket not connected"))
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self, host: &str, port: u16) -> io::Result<ConnectStatus> {
        // IPv6 literals may arrive with or without brackets
        let host = host.trim_start_matches('[').trim_end_matches(']');

        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    // Disable Nagle's algorithm for low latency
                    stream.set_nodelay(true)?;
                    stream.set_nonblocking(true)?;
                    self.stream = Some(stream);
                    return Ok(ConnectStatus::Connected);
                }
                Err(e) => {
                    tracing::debug!("connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no addresses for {}:{}", host, port),
            )
        }))
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.stream()?.write(bytes)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream()?.read(buf)
    }

    fn set_blocking(&mut self, blocking: bool) -> io::Result<()> {
        let read_timeout = self.read_timeout;
        let write_timeout = self.write_timeout;
        let stream = self.stream()?;

        stream.set_nonblocking(!blocking)?;
        if blocking {
            // A zero Duration is rejected by set_*_timeout
            if !read_timeout.is_zero() {
                stream.set_read_timeout(Some(read_timeout))?;
            }
            if !write_timeout.is_zero() {
                stream.set_write_timeout(Some(write_timeout))?;
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

/// Factory producing [`TcpTransport`]s with configured timeouts
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl TcpConnector {
    pub fn new(config: &Config) -> Self {
        Self {
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            write_timeout: Duration::from_millis(config.write_timeout_ms),
        }
    }
}

impl TransportFactory for TcpConnector {
    fn create(&self, backend: &BackendConfig, role: Role) -> Box<dyn Transport> {
        tracing::trace!(backend = %backend.name, %role, "creating tcp transport");
        Box::new(TcpTransport::new(
            self.connect_timeout,
            self.read_timeout,
            self.write_timeout,
        ))
    }
}
