//! Connection
//!
//! One socket, its pending-write buffer, its decoder and its outstanding
//! FIFO. The reactor feeds it readiness events; it turns commands into wire
//! bytes and wire bytes into handler callbacks.
//!
//! ## Lifecycle
//! ```text
//!   Connecting ──on_connect──► Connected ──error / close / desync──► Closed
//!        │                                                             ▲
//!        └──────────────────── connect error ──────────────────────────┘
//! ```
//! A closed connection has failed every outstanding handler exactly once and
//! is discarded by its service; a replacement is created on next use.

use std::fmt;
use std::io;

use bytes::{Buf, BytesMut};

use super::{OutstandingQueue, OwnerId, Pending, SubscriptionRouter, CONNECTION_LOST, SHUTTING_DOWN};
use crate::config::BackendConfig;
use crate::error::{LinkError, Result};
use crate::network::{ConnectStatus, Transport};
use crate::protocol::{encode_command_into, Decoded, Reply, ReplyDecoder};

/// Size of a single socket read
const READ_CHUNK: usize = 16 * 1024;

/// What a connection is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Request/reply traffic, correlated by FIFO order
    Command,

    /// Pub/sub traffic, correlated by channel name
    Subscriber,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Command => f.write_str("command"),
            Role::Subscriber => f.write_str("sub"),
        }
    }
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Closed,
}

/// A single backend connection
pub struct Connection {
    /// Command or subscriber traffic
    role: Role,

    /// Backend name, for logging
    backend: String,

    /// Database index selected by the handshake
    db: u32,

    /// Name announced by the handshake
    client_name: String,

    /// Underlying socket
    transport: Box<dyn Transport>,

    /// Lifecycle state
    state: ConnectionState,

    /// Decoder holding any partially received reply
    decoder: ReplyDecoder,

    /// Encoded commands not yet accepted by the socket
    write_buf: BytesMut,

    /// Entries awaiting replies, oldest first (command role only)
    outstanding: OutstandingQueue,
}

impl Connection {
    /// Create a connection and start connecting
    ///
    /// When the transport connects synchronously the handshake is queued
    /// immediately; otherwise it waits for [`Connection::on_connect`].
    pub fn open(
        role: Role,
        backend: &BackendConfig,
        client_name: &str,
        max_bulk_len: usize,
        mut transport: Box<dyn Transport>,
    ) -> Result<Self> {
        let status = transport.connect(&backend.host, backend.port).map_err(|e| {
            tracing::warn!(backend = %backend.name, %role, "connect to {}:{} failed: {}", backend.host, backend.port, e);
            LinkError::Connection(format!(
                "unable to connect to {}:{}: {}",
                backend.host, backend.port, e
            ))
        })?;

        let mut connection = Self {
            role,
            backend: backend.name.clone(),
            db: backend.db,
            client_name: client_name.to_string(),
            transport,
            state: ConnectionState::Connecting,
            decoder: ReplyDecoder::with_max_bulk_len(max_bulk_len),
            write_buf: BytesMut::with_capacity(4 * 1024),
            outstanding: OutstandingQueue::new(),
        };

        if status == ConnectStatus::Connected {
            connection.on_connect();
        }
        Ok(connection)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// Entries (including placeholders) awaiting a reply
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// Handlers awaiting a reply
    pub fn waiting_handlers(&self) -> usize {
        self.outstanding.waiting_handlers()
    }

    /// Bytes queued but not yet accepted by the socket
    pub fn pending_write(&self) -> usize {
        self.write_buf.len()
    }

    // =========================================================================
    // Sending
    // =========================================================================

    /// Serialize a command and track its reply
    ///
    /// Subscriber connections never track replies; those are routed by
    /// channel instead.
    pub fn send<A: AsRef<[u8]>>(&mut self, args: &[A], entry: Pending) -> Result<()> {
        if self.is_closed() {
            return Err(LinkError::Connection(format!(
                "{} ({}) connection is closed",
                self.backend, self.role
            )));
        }

        encode_command_into(&mut self.write_buf, args);
        if self.role == Role::Command {
            self.outstanding.push_back(entry);
        }

        if self.state == ConnectionState::Connected {
            self.flush_or_fail();
        }
        Ok(())
    }

    /// Write as much of the pending buffer as the socket accepts
    pub fn flush(&mut self) -> io::Result<()> {
        while !self.write_buf.is_empty() {
            match self.transport.send(&self.write_buf) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => self.write_buf.advance(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn flush_or_fail(&mut self) {
        if let Err(e) = self.flush() {
            self.on_error(&e.to_string());
        }
    }

    // =========================================================================
    // Reactor Callbacks
    // =========================================================================

    /// The socket finished connecting
    ///
    /// The handshake goes ahead of anything queued while connecting, so
    /// early commands already run against the selected database.
    pub fn on_connect(&mut self) {
        if self.state != ConnectionState::Connecting {
            return;
        }
        self.state = ConnectionState::Connected;
        tracing::info!(backend = %self.backend, role = %self.role, "successfully connected");

        let db = self.db.to_string();
        let mut handshake = BytesMut::new();
        encode_command_into(&mut handshake, &["CLIENT", "SETNAME", self.client_name.as_str()]);
        encode_command_into(&mut handshake, &["SELECT", db.as_str()]);
        handshake.extend_from_slice(&self.write_buf);
        self.write_buf = handshake;

        if self.role == Role::Command {
            self.outstanding.push_front(Pending::Discard);
            self.outstanding.push_front(Pending::Discard);
        }

        self.flush_or_fail();
    }

    /// The socket can accept more bytes
    pub fn on_writable(&mut self) {
        if self.state == ConnectionState::Connected {
            self.flush_or_fail();
        }
    }

    /// Bytes arrived; returns how many were consumed (always all of them)
    pub fn on_readable(&mut self, bytes: &[u8], router: &SubscriptionRouter) -> usize {
        let mut rest = bytes;

        while !rest.is_empty() && !self.is_closed() {
            match self.decoder.feed(rest) {
                Ok(Decoded::Incomplete) => break,
                Ok(Decoded::Complete { consumed, reply }) => {
                    rest = &rest[consumed.min(rest.len())..];
                    self.route(reply, router);
                }
                Err(e) => {
                    tracing::warn!(
                        backend = %self.backend,
                        role = %self.role,
                        "protocol desync: {}; dropping connection",
                        e
                    );
                    self.fail(CONNECTION_LOST);
                    break;
                }
            }
        }

        bytes.len()
    }

    /// The socket reported an error or was closed
    pub fn on_error(&mut self, reason: &str) {
        if self.is_closed() {
            return;
        }
        tracing::warn!(backend = %self.backend, role = %self.role, "error: {}", reason);
        self.fail(CONNECTION_LOST);
    }

    fn route(&mut self, reply: Reply, router: &SubscriptionRouter) {
        if self.role == Role::Subscriber {
            router.route(&reply);
            return;
        }

        match self.outstanding.pop_front() {
            None => {
                tracing::debug!(backend = %self.backend, "{} reply with no outstanding request", reply.kind());
            }
            Some(Pending::Discard) => {
                tracing::trace!(backend = %self.backend, "discarding {} reply", reply.kind());
            }
            Some(Pending::Handler(handler)) => handler.dispatch(&reply),
            Some(Pending::Transaction(batch)) => batch.dispatch(&reply),
        }
    }

    // =========================================================================
    // Driving I/O
    // =========================================================================

    /// Flush, then read until the socket would block
    ///
    /// For hosts without their own reactor.
    pub fn poll(&mut self, router: &SubscriptionRouter) {
        if self.state != ConnectionState::Connected {
            return;
        }
        self.flush_or_fail();

        let mut buf = [0u8; READ_CHUNK];
        while !self.is_closed() {
            match self.transport.recv(&mut buf) {
                Ok(0) => self.on_error("connection closed by peer"),
                Ok(n) => {
                    self.on_readable(&buf[..n], router);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => self.on_error(&e.to_string()),
            }
        }
    }

    /// Flush everything, then run one blocking read cycle
    ///
    /// Stalls the calling thread for up to the transport's read timeout.
    /// Meant for bootstrap only. Returns true while replies are still
    /// outstanding.
    pub fn block_and_process(&mut self, router: &SubscriptionRouter) -> Result<bool> {
        if self.state != ConnectionState::Connected {
            return Ok(!self.outstanding.is_empty());
        }

        if let Err(e) = self.transport.set_blocking(true) {
            self.on_error(&e.to_string());
            return Err(e.into());
        }

        let mut buf = [0u8; READ_CHUNK];
        let read = self.flush().and_then(|_| loop {
            match self.transport.recv(&mut buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => break other,
            }
        });

        if let Err(e) = self.transport.set_blocking(false) {
            tracing::debug!(backend = %self.backend, "unable to restore non-blocking mode: {}", e);
        }

        match read {
            Ok(0) => self.on_error("connection closed by peer"),
            Ok(n) => {
                self.on_readable(&buf[..n], router);
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                tracing::debug!(backend = %self.backend, "blocking read timed out");
            }
            Err(e) => self.on_error(&e.to_string()),
        }

        Ok(!self.outstanding.is_empty())
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Fail and detach every handler registered by `owner`
    pub fn sweep_owner(&mut self, owner: &OwnerId, reason: &str) -> usize {
        self.outstanding.sweep_owner(owner, reason)
    }

    /// Close the connection, failing everything outstanding once
    pub fn shutdown(&mut self, reason: &str) -> usize {
        if self.is_closed() {
            return 0;
        }
        self.fail(reason)
    }

    fn fail(&mut self, reason: &str) -> usize {
        self.state = ConnectionState::Closed;
        self.transport.close();
        self.decoder.reset();
        self.write_buf.clear();

        let notified = self.outstanding.fail_all(reason);
        if notified > 0 {
            tracing::debug!(
                backend = %self.backend,
                role = %self.role,
                "failed {} outstanding handlers: {}",
                notified,
                reason
            );
        }
        notified
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown(SHUTTING_DOWN);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("backend", &self.backend)
            .field("role", &self.role)
            .field("state", &self.state)
            .field("outstanding", &self.outstanding.len())
            .field("pending_write", &self.write_buf.len())
            .finish()
    }
}
