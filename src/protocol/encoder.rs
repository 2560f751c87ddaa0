//! Command encoding
//!
//! Every command goes out as a Multi of Bulk strings. Arguments are copied
//! verbatim, so binary payloads need no escaping.

use bytes::BytesMut;

use super::CRLF;

/// Encode a command (name followed by arguments) to bytes
pub fn encode_command<A: AsRef<[u8]>>(args: &[A]) -> BytesMut {
    let payload: usize = args.iter().map(|a| a.as_ref().len() + 16).sum();
    let mut buf = BytesMut::with_capacity(16 + payload);
    encode_command_into(&mut buf, args);
    buf
}

/// Append an encoded command to an existing buffer
pub fn encode_command_into<A: AsRef<[u8]>>(buf: &mut BytesMut, args: &[A]) {
    buf.extend_from_slice(b"*");
    buf.extend_from_slice(args.len().to_string().as_bytes());
    buf.extend_from_slice(CRLF);

    for arg in args {
        let arg = arg.as_ref();
        buf.extend_from_slice(b"$");
        buf.extend_from_slice(arg.len().to_string().as_bytes());
        buf.extend_from_slice(CRLF);
        buf.extend_from_slice(arg);
        buf.extend_from_slice(CRLF);
    }
}

/// Split a command line on whitespace
///
/// Used by the string form of `send_command`; arguments containing spaces
/// must go through the slice form instead.
pub fn split_command(line: &str) -> Vec<&str> {
    line.split_whitespace().collect()
}
