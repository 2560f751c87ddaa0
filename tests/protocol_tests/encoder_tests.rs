//! Encoder Tests
//!
//! Tests for command serialization.

use bytes::BytesMut;
use resplink::protocol::{encode_command, encode_command_into, split_command, Decoded, Reply, ReplyDecoder};

#[test]
fn test_encode_simple_command() {
    let encoded = encode_command(&["SET", "key", "value"]);
    assert_eq!(&encoded[..], b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n");
}

#[test]
fn test_encode_single_word() {
    assert_eq!(&encode_command(&["PING"])[..], b"*1\r\n$4\r\nPING\r\n");
}

#[test]
fn test_encode_empty_argument() {
    assert_eq!(&encode_command(&["ECHO", ""])[..], b"*2\r\n$4\r\nECHO\r\n$0\r\n\r\n");
}

#[test]
fn test_encode_binary_argument() {
    let payload: &[u8] = &[0x00, 0xff, b'\r', b'\n', b'*'];
    let encoded = encode_command(&[b"SET".as_slice(), b"bin".as_slice(), payload]);

    assert!(encoded.ends_with(b"$5\r\n\x00\xff\r\n*\r\n"));

    // The decoder reads it back as a Multi of Bulks
    let decoded = ReplyDecoder::new().decode(&encoded).unwrap();
    let Decoded::Complete { consumed, reply } = decoded else {
        panic!("expected a complete reply");
    };
    assert_eq!(consumed, encoded.len());
    assert_eq!(reply.as_multi().unwrap()[2], Reply::bulk(payload.to_vec()));
}

#[test]
fn test_encode_into_appends() {
    let mut buf = BytesMut::from(&b"+already\r\n"[..]);
    encode_command_into(&mut buf, &["GET", "a"]);
    encode_command_into(&mut buf, &["GET", "b"]);

    assert_eq!(
        &buf[..],
        b"+already\r\n*2\r\n$3\r\nGET\r\n$1\r\na\r\n*2\r\n$3\r\nGET\r\n$1\r\nb\r\n"
    );
}

#[test]
fn test_encode_owned_arguments() {
    let args = vec!["HSET".to_string(), "h".to_string(), 10.to_string()];
    assert_eq!(
        &encode_command(&args)[..],
        b"*3\r\n$4\r\nHSET\r\n$1\r\nh\r\n$2\r\n10\r\n"
    );
}

#[test]
fn test_split_command() {
    assert_eq!(split_command("GET key"), vec!["GET", "key"]);
    assert_eq!(split_command("  SET\tk   v \n"), vec!["SET", "k", "v"]);
    assert!(split_command("").is_empty());
    assert!(split_command(" \t ").is_empty());
}
