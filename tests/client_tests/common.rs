//! Shared test fixtures
//!
//! - `MockNet`: transport factory handing out scripted in-memory sockets
//! - `Recorder`: handler that remembers every callback

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use resplink::network::{ConnectStatus, Transport, TransportFactory};
use resplink::protocol::{Decoded, ReplyDecoder};
use resplink::{BackendConfig, Config, HandlerRef, OwnerId, ProtocolService, Reply, ReplyHandler, Role};

// =============================================================================
// Scripted Transport
// =============================================================================

/// State of one in-memory socket, shared between test and transport
#[derive(Default)]
pub struct Wire {
    /// Everything the client wrote
    pub written: Vec<u8>,

    /// Chunks returned by successive `recv` calls
    pub inbox: VecDeque<Vec<u8>>,

    /// Peer has closed; `recv` returns 0 once the inbox is empty
    pub peer_closed: bool,

    /// Remaining bytes `send` will accept; `None` is unlimited
    pub accept_limit: Option<usize>,

    /// Every `send` fails with BrokenPipe
    pub fail_writes: bool,

    /// Every `set_blocking` call, in order
    pub blocking_calls: Vec<bool>,

    /// `close` was called by the client
    pub closed_by_client: bool,
}

pub type SharedWire = Rc<RefCell<Wire>>;

pub struct MockTransport {
    wire: SharedWire,
    connect_error: bool,
    in_progress: bool,
}

impl Transport for MockTransport {
    fn connect(&mut self, _host: &str, _port: u16) -> io::Result<ConnectStatus> {
        if self.connect_error {
            return Err(io::ErrorKind::ConnectionRefused.into());
        }
        Ok(if self.in_progress {
            ConnectStatus::InProgress
        } else {
            ConnectStatus::Connected
        })
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let mut wire = self.wire.borrow_mut();
        if wire.fail_writes {
            return Err(io::ErrorKind::BrokenPipe.into());
        }

        let n = wire.accept_limit.map_or(bytes.len(), |limit| limit.min(bytes.len()));
        if n == 0 {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        if let Some(limit) = wire.accept_limit.as_mut() {
            *limit -= n;
        }
        wire.written.extend_from_slice(&bytes[..n]);
        Ok(n)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut wire = self.wire.borrow_mut();
        match wire.inbox.pop_front() {
            Some(chunk) => {
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
            None if wire.peer_closed => Ok(0),
            None => Err(io::ErrorKind::WouldBlock.into()),
        }
    }

    fn set_blocking(&mut self, blocking: bool) -> io::Result<()> {
        self.wire.borrow_mut().blocking_calls.push(blocking);
        Ok(())
    }

    fn close(&mut self) {
        self.wire.borrow_mut().closed_by_client = true;
    }
}

/// Factory recording every socket it creates
#[derive(Default)]
pub struct MockNet {
    pub wires: RefCell<Vec<(Role, SharedWire)>>,
    pub connect_error: RefCell<bool>,
    pub in_progress: RefCell<bool>,
}

impl MockNet {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Most recent socket created for `role`
    pub fn wire(&self, role: Role) -> SharedWire {
        self.wires
            .borrow()
            .iter()
            .rev()
            .find(|(r, _)| *r == role)
            .map(|(_, wire)| Rc::clone(wire))
            .expect("no socket created for role")
    }

    /// Number of sockets created for `role`
    pub fn created(&self, role: Role) -> usize {
        self.wires.borrow().iter().filter(|(r, _)| *r == role).count()
    }
}

impl TransportFactory for MockNet {
    fn create(&self, _backend: &BackendConfig, role: Role) -> Box<dyn Transport> {
        let wire = SharedWire::default();
        self.wires.borrow_mut().push((role, Rc::clone(&wire)));
        Box::new(MockTransport {
            wire,
            connect_error: *self.connect_error.borrow(),
            in_progress: *self.in_progress.borrow(),
        })
    }
}

/// Standalone transport for driving a `Connection` directly
pub fn transport() -> (Box<dyn Transport>, SharedWire) {
    let wire = SharedWire::default();
    let transport = MockTransport {
        wire: Rc::clone(&wire),
        connect_error: false,
        in_progress: false,
    };
    (Box::new(transport), wire)
}

pub fn in_progress_transport() -> (Box<dyn Transport>, SharedWire) {
    let wire = SharedWire::default();
    let transport = MockTransport {
        wire: Rc::clone(&wire),
        connect_error: false,
        in_progress: true,
    };
    (Box::new(transport), wire)
}

/// Decode the commands a client wrote (they are Multis of Bulks)
pub fn written_commands(wire: &SharedWire) -> Vec<Vec<String>> {
    let written = wire.borrow().written.clone();
    let mut decoder = ReplyDecoder::new();
    let mut rest = written.as_slice();
    let mut commands = Vec::new();

    while !rest.is_empty() {
        match decoder.decode(rest).unwrap() {
            Decoded::Incomplete => panic!("partial command written: {:?}", rest),
            Decoded::Complete { consumed, reply } => {
                let args = reply
                    .as_multi()
                    .unwrap()
                    .iter()
                    .map(|arg| arg.as_str().unwrap().to_string())
                    .collect();
                commands.push(args);
                rest = &rest[consumed..];
            }
        }
    }
    commands
}

pub fn command(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

// =============================================================================
// Recording Handler
// =============================================================================

#[derive(Debug, Default)]
pub struct Recorder {
    pub results: Vec<Reply>,
    pub errors: Vec<String>,
}

impl Recorder {
    pub fn calls(&self) -> usize {
        self.results.len() + self.errors.len()
    }
}

impl ReplyHandler for Recorder {
    fn on_result(&mut self, reply: &Reply) {
        self.results.push(reply.clone());
    }

    fn on_error(&mut self, reason: &str) {
        self.errors.push(reason.to_string());
    }
}

pub fn recorder() -> Rc<RefCell<Recorder>> {
    Rc::new(RefCell::new(Recorder::default()))
}

pub fn handle(owner: &str, recorder: &Rc<RefCell<Recorder>>) -> HandlerRef {
    HandlerRef::new(OwnerId::new(owner), recorder)
}

// =============================================================================
// Service Setup
// =============================================================================

/// Two `+OK`s answering CLIENT SETNAME and SELECT
pub const HANDSHAKE_REPLIES: &[u8] = b"+OK\r\n+OK\r\n";

pub fn backend() -> BackendConfig {
    BackendConfig::new("main", "localhost", 6379, 3)
}

pub fn test_config() -> Config {
    Config::builder()
        .backend(backend())
        .client_name("tests")
        .build()
}

pub fn setup_service() -> (Rc<MockNet>, ProtocolService) {
    let net = MockNet::new();
    let config = test_config();
    let service = ProtocolService::new(backend(), &config, Rc::clone(&net) as Rc<dyn TransportFactory>);
    (net, service)
}
