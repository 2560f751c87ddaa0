//! Protocol Module
//!
//! RESP wire format: typed, length-prefixed, CRLF-terminated replies.
//!
//! ## Reply Grammar
//! ```text
//! ┌──────┬──────────────────────────────────────┬──────────────┐
//! │ Byte │ Form                                 │ Reply        │
//! ├──────┼──────────────────────────────────────┼──────────────┤
//! │  +   │ +<text>\r\n                          │ Status       │
//! │  -   │ -<text>\r\n                          │ Error        │
//! │  :   │ :<int>\r\n                           │ Integer      │
//! │  $   │ $<len>\r\n<len bytes>\r\n | $-1\r\n  │ Bulk         │
//! │  *   │ *<count>\r\n <count replies>         │ Multi        │
//! └──────┴──────────────────────────────────────┴──────────────┘
//! ```
//!
//! ### Request Format
//! Commands are always sent as a Multi of Bulk arguments:
//! ```text
//! *<N>\r\n $<len(a0)>\r\n a0 \r\n ... $<len(aN-1)>\r\n aN-1 \r\n
//! ```

mod reply;
mod decoder;
mod encoder;

pub use reply::Reply;
pub use decoder::{DecodeError, Decoded, ReplyDecoder};
pub use encoder::{encode_command, encode_command_into, split_command};

/// Line terminator used by every RESP token
pub const CRLF: &[u8] = b"\r\n";
