//! Error types for resplink
//!
//! Provides a unified error type for all caller-visible operations.
//! Faults that happen inside the reactor path (decode errors, lost
//! connections) never surface here; they reach handlers through `on_error`.

use thiserror::Error;

use crate::protocol::DecodeError;

/// Result type alias using LinkError
pub type Result<T> = std::result::Result<T, LinkError>;

/// Unified error type for resplink operations
#[derive(Debug, Error)]
pub enum LinkError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    // -------------------------------------------------------------------------
    // Connection Errors
    // -------------------------------------------------------------------------
    #[error("Connection error: {0}")]
    Connection(String),

    // -------------------------------------------------------------------------
    // Usage Errors
    // -------------------------------------------------------------------------
    #[error("A transaction is already open")]
    TransactionAlreadyOpen,

    #[error("No transaction is open")]
    NoTransaction,

    #[error("Transaction aborted: its connection was lost")]
    TransactionAborted,

    #[error("Empty command")]
    EmptyCommand,

    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
