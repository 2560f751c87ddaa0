//! Network Module
//!
//! Socket abstraction consumed by the client.
//!
//! ## Architecture
//! - The host reactor owns readiness notification and calls back into
//!   [`ProtocolService`](crate::client::ProtocolService)
//! - A [`Transport`] only moves bytes; it never interprets them
//! - [`TcpTransport`] is the std-net implementation used by the CLI

mod transport;
mod tcp;

pub use transport::{ConnectStatus, Transport, TransportFactory};
pub use tcp::{TcpConnector, TcpTransport};
