//! Reply definitions
//!
//! Represents fully decoded replies from a backend.

use bytes::Bytes;

/// A complete reply value
///
/// A `Multi` handed out by the decoder is always complete, recursively.
/// Partial arrays only exist inside [`ReplyDecoder`](super::ReplyDecoder).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Simple positive acknowledgement (`+OK`)
    Status(String),

    /// Simple negative acknowledgement (`-ERR ...`)
    Error(String),

    /// Numeric reply
    Integer(i64),

    /// Length-prefixed payload; `None` is the null bulk (`$-1`)
    Bulk(Option<Bytes>),

    /// Ordered array of replies
    Multi(Vec<Reply>),
}

impl Reply {
    /// Build a non-null bulk reply
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(Some(data.into()))
    }

    /// Build the null bulk reply
    pub fn nil() -> Self {
        Reply::Bulk(None)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Bulk(None))
    }

    /// Raw bytes of a bulk or status reply
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Reply::Bulk(Some(data)) => Some(&data[..]),
            Reply::Status(text) | Reply::Error(text) => Some(text.as_bytes()),
            _ => None,
        }
    }

    /// UTF-8 view of a bulk or status reply
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_multi(&self) -> Option<&[Reply]> {
        match self {
            Reply::Multi(items) => Some(items),
            _ => None,
        }
    }

    /// Short type name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Status(_) => "status",
            Reply::Error(_) => "error",
            Reply::Integer(_) => "integer",
            Reply::Bulk(_) => "bulk",
            Reply::Multi(_) => "multi",
        }
    }
}
