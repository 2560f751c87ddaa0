//! Reply decoder
//!
//! Resumable decoder for the reply grammar. Bytes may arrive split at any
//! offset; the decoder never partially consumes a token and keeps the
//! progress of an in-flight Multi between calls.
//!
//! ## State
//! ```text
//!   partial: [ Multi{declared: 2, items: [..]}   <- outermost
//!              Multi{declared: 3, items: [..]} ] <- innermost, being filled
//!   settled: bytes of the presented buffer already folded into `partial`
//! ```
//!
//! Two calling styles are supported:
//! - [`ReplyDecoder::decode`]: the caller owns the buffer and re-presents
//!   every unconsumed byte on the next call.
//! - [`ReplyDecoder::feed`]: the decoder carries unconsumed bytes itself and
//!   the caller only hands over newly arrived chunks.

use bytes::{Bytes, BytesMut};
use thiserror::Error;

use super::{Reply, CRLF};
use crate::config::DEFAULT_MAX_BULK_LEN;

/// Longest `$`/`*` header line accepted while still waiting for its CRLF
const MAX_LENGTH_LINE: usize = 32;

/// Fatal framing faults
///
/// After any of these the byte stream can no longer be trusted to line up
/// with outstanding requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown reply type byte 0x{0:02x}")]
    UnknownType(u8),

    #[error("invalid length header {0:?}")]
    InvalidLength(String),

    #[error("bulk payload not terminated by CRLF")]
    MissingTerminator,

    #[error("bulk length {len} exceeds maximum {max}")]
    TooLarge { len: usize, max: usize },
}

/// Outcome of a decode attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Not enough bytes for a full reply; nothing was consumed
    Incomplete,

    /// A full reply and the number of bytes it occupied
    Complete { consumed: usize, reply: Reply },
}

impl Decoded {
    pub fn consumed(&self) -> usize {
        match self {
            Decoded::Incomplete => 0,
            Decoded::Complete { consumed, .. } => *consumed,
        }
    }

    pub fn into_reply(self) -> Option<Reply> {
        match self {
            Decoded::Incomplete => None,
            Decoded::Complete { reply, .. } => Some(reply),
        }
    }
}

/// A Multi whose elements are still arriving
#[derive(Debug)]
struct PartialMulti {
    declared: usize,
    items: Vec<Reply>,
}

/// One fully buffered token
enum Token {
    Value(Reply),
    MultiHeader(i64),
}

/// Stateful, per-connection reply decoder
#[derive(Debug)]
pub struct ReplyDecoder {
    /// Open arrays, outermost first
    partial: Vec<PartialMulti>,

    /// Prefix of the presented buffer already folded into `partial`
    settled: usize,

    /// Bytes carried between `feed` calls
    pending: BytesMut,

    /// Upper bound for a single bulk payload
    max_bulk_len: usize,
}

impl Default for ReplyDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplyDecoder {
    pub fn new() -> Self {
        Self::with_max_bulk_len(DEFAULT_MAX_BULK_LEN)
    }

    pub fn with_max_bulk_len(max_bulk_len: usize) -> Self {
        Self {
            partial: Vec::new(),
            settled: 0,
            pending: BytesMut::new(),
            max_bulk_len,
        }
    }

    /// Decode one reply from the front of `buf`
    ///
    /// On `Incomplete` nothing is consumed and the next call must present
    /// the same bytes again, optionally followed by new ones. Elements of
    /// an in-flight Multi that were already decoded are not parsed twice.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] on an unknown type byte or a malformed
    /// length header. The decoder resets itself in that case.
    pub fn decode(&mut self, buf: &[u8]) -> Result<Decoded, DecodeError> {
        if buf.len() < self.settled {
            tracing::warn!(
                settled = self.settled,
                presented = buf.len(),
                "decoder presented fewer bytes than already settled; restarting reply"
            );
            self.reset();
        }

        let mut pos = self.settled;

        loop {
            let (used, token) = match self.parse_token(&buf[pos..]) {
                Ok(Some(parsed)) => parsed,
                Ok(None) => {
                    self.settled = pos;
                    return Ok(Decoded::Incomplete);
                }
                Err(e) => {
                    self.reset();
                    return Err(e);
                }
            };
            pos += used;

            let mut value = match token {
                Token::Value(reply) => reply,
                Token::MultiHeader(count) if count < 0 => Reply::Bulk(None),
                Token::MultiHeader(0) => Reply::Multi(Vec::new()),
                Token::MultiHeader(count) => {
                    let Ok(declared) = usize::try_from(count) else {
                        self.reset();
                        return Err(DecodeError::InvalidLength(count.to_string()));
                    };
                    self.partial.push(PartialMulti {
                        declared,
                        items: Vec::with_capacity(declared.min(1024)),
                    });
                    continue;
                }
            };

            // Fold the finished value into its enclosing arrays
            loop {
                let Some(mut top) = self.partial.pop() else {
                    self.settled = 0;
                    return Ok(Decoded::Complete {
                        consumed: pos,
                        reply: value,
                    });
                };

                top.items.push(value);
                if top.items.len() < top.declared {
                    self.partial.push(top);
                    break;
                }
                value = Reply::Multi(top.items);
            }
        }
    }

    /// Decode using the internal carry-over buffer
    ///
    /// `consumed` in the result counts bytes of `chunk` only. When it is
    /// smaller than `chunk.len()` the remainder belongs to the next reply
    /// and must be fed again.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Decoded, DecodeError> {
        let carried = self.pending.len();
        self.pending.extend_from_slice(chunk);

        let mut buf = std::mem::take(&mut self.pending);
        let result = self.decode(&buf);

        match result {
            Ok(Decoded::Incomplete) => {
                self.pending = buf;
                Ok(Decoded::Incomplete)
            }
            Ok(Decoded::Complete { consumed, reply }) => {
                buf.clear();
                self.pending = buf;
                Ok(Decoded::Complete {
                    consumed: consumed.saturating_sub(carried),
                    reply,
                })
            }
            Err(e) => {
                buf.clear();
                self.pending = buf;
                Err(e)
            }
        }
    }

    /// Drop all partial state
    pub fn reset(&mut self) {
        self.partial.clear();
        self.settled = 0;
        self.pending.clear();
    }

    /// True when no reply is in flight
    pub fn is_idle(&self) -> bool {
        self.partial.is_empty() && self.settled == 0 && self.pending.is_empty()
    }

    /// Bytes carried over by `feed`
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Parse a single token at the front of `buf`
    fn parse_token(&self, buf: &[u8]) -> Result<Option<(usize, Token)>, DecodeError> {
        let Some(&kind) = buf.first() else {
            return Ok(None);
        };

        if !matches!(kind, b'+' | b'-' | b':' | b'$' | b'*') {
            return Err(DecodeError::UnknownType(kind));
        }

        let Some(nl) = find_crlf(&buf[1..]) else {
            if matches!(kind, b'$' | b'*') && buf.len() > 1 + MAX_LENGTH_LINE {
                return Err(DecodeError::InvalidLength(lossy(
                    &buf[1..1 + MAX_LENGTH_LINE],
                )));
            }
            return Ok(None);
        };

        let line = &buf[1..1 + nl];
        let header_len = 1 + nl + CRLF.len();

        let token = match kind {
            b'+' => {
                let text = lossy(line);
                tracing::trace!("status ok: {}", text);
                Token::Value(Reply::Status(text))
            }
            b'-' => {
                let text = lossy(line);
                tracing::trace!("status error: {}", text);
                Token::Value(Reply::Error(text))
            }
            b':' => Token::Value(Reply::Integer(parse_integer(line))),
            b'$' => {
                let len = parse_length(line)?;
                if len < 0 {
                    return Ok(Some((header_len, Token::Value(Reply::Bulk(None)))));
                }

                let len = usize::try_from(len)
                    .map_err(|_| DecodeError::InvalidLength(lossy(line)))?;
                if len > self.max_bulk_len {
                    return Err(DecodeError::TooLarge {
                        len,
                        max: self.max_bulk_len,
                    });
                }

                let total = header_len + len + CRLF.len();
                if buf.len() < total {
                    return Ok(None);
                }
                if &buf[header_len + len..total] != CRLF {
                    return Err(DecodeError::MissingTerminator);
                }

                let data = Bytes::copy_from_slice(&buf[header_len..header_len + len]);
                return Ok(Some((total, Token::Value(Reply::Bulk(Some(data))))));
            }
            _ => Token::MultiHeader(parse_length(line)?),
        };

        Ok(Some((header_len, token)))
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Integer payloads that do not parse degrade to 0
fn parse_integer(line: &[u8]) -> i64 {
    match std::str::from_utf8(line).ok().and_then(|s| s.parse().ok()) {
        Some(value) => value,
        None => {
            tracing::debug!("malformed integer reply {:?}, using 0", lossy(line));
            0
        }
    }
}

fn parse_length(line: &[u8]) -> Result<i64, DecodeError> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| DecodeError::InvalidLength(lossy(line)))
}
