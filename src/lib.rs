//! # resplink
//!
//! A reactor-driven client for RESP key-value backends:
//! - Resumable reply decoding across arbitrary fragment boundaries
//! - Strict FIFO correlation of replies to pipelined requests
//! - MULTI/EXEC transactions demultiplexed back to per-command handlers
//! - Pub/sub routing by channel on a dedicated connection
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     BackendRegistry                          │
//! │              (named backends, reload, owner sweep)           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    ProtocolService                           │
//! │       (send / subscribe / transactions / drain)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ Connection  │          │ Connection  │
//!   │  (command)  │          │    (sub)    │
//!   └──────┬──────┘          └──────┬──────┘
//!          │                        │
//!          ▼                        ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ ReplyDecoder│          │ ReplyDecoder│
//!   │  + FIFO     │          │  + Router   │
//!   └─────────────┘          └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use resplink::{BackendConfig, Config, HandlerRef, OwnerId, ProtocolService};
//! use resplink::network::TcpConnector;
//!
//! let config = Config::builder()
//!     .backend(BackendConfig::new("main", "127.0.0.1", 6379, 0))
//!     .build();
//! let factory = Rc::new(TcpConnector::new(&config));
//! let mut service = ProtocolService::new(config.backends[0].clone(), &config, factory);
//!
//! let handler = Rc::new(RefCell::new(MyHandler::default()));
//! service.send(Some(HandlerRef::new(OwnerId::new("example"), &handler)), &["GET", "key"])?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod client;
pub mod network;
pub mod registry;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{LinkError, Result};
pub use config::{BackendConfig, Config};
pub use client::{HandlerRef, OwnerId, ProtocolService, ReplyHandler, Role};
pub use protocol::Reply;
pub use registry::BackendRegistry;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of resplink
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
