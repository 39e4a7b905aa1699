//! Integration tests for resp3-client.
//!
//! These tests exercise the protocol and adapter layers together, without a
//! connection.

use bytes::{Bytes, BytesMut};
use resp3_client::adapter::{adapt, Attributed, KeyValues};
use resp3_client::protocol::{
    encode_value, Batch, Command, Kind, Parser, ReadBuffer, StreamDecoder, Value,
};
use resp3_client::{RespError, Status};

fn encode(value: &Value) -> Vec<u8> {
    let mut out = BytesMut::new();
    encode_value(value, &mut out);
    out.to_vec()
}

fn parse_all(bytes: &[u8]) -> Vec<Value> {
    let mut decoder = StreamDecoder::new();
    decoder.push(bytes).unwrap()
}

/// An encoded command is read back as an array of blob strings.
#[test]
fn test_command_decodes_as_blob_array() {
    let command = Command::new("SET").arg("key").arg(42).arg(&b"\x00\xff"[..]);
    let values = parse_all(&command.to_bytes());

    assert_eq!(values.len(), 1);
    assert_eq!(
        values[0],
        Value::Array(vec![
            Value::BlobString(Bytes::from_static(b"SET")),
            Value::BlobString(Bytes::from_static(b"key")),
            Value::BlobString(Bytes::from_static(b"42")),
            Value::BlobString(Bytes::from_static(b"\x00\xff")),
        ])
    );
    assert_eq!(values[0], command.to_value());
}

/// A batch is the concatenation of its commands.
#[test]
fn test_batch_wire_is_concatenation() {
    let set = Command::new("SET").arg("k").arg("v");
    let get = Command::new("GET").arg("k");
    let batch = Batch::new().command(set.clone()).command(get.clone());

    let mut expected = set.to_bytes().to_vec();
    expected.extend_from_slice(&get.to_bytes());
    assert_eq!(&batch.wire()[..], &expected[..]);
    assert_eq!(parse_all(batch.wire()).len(), 2);
}

fn complex_reply() -> Value {
    Value::Map(vec![
        (
            Value::SimpleString("name".into()),
            Value::BlobString(Bytes::from_static(b"redis")),
        ),
        (
            Value::SimpleString("modules".into()),
            Value::Array(vec![
                Value::Integer(-7),
                Value::Double(1.5),
                Value::Null,
                Value::Boolean(true),
            ]),
        ),
        (
            Value::SimpleString("tags".into()),
            Value::Set(vec![Value::BigNumber("123456789012345678901234567890".into())]),
        ),
        (
            Value::SimpleString("doc".into()),
            Value::VerbatimString {
                format: "txt".into(),
                data: Bytes::from_static(b"Some string"),
            },
        ),
    ])
}

/// Splitting a reply at every byte position yields the same value.
#[test]
fn test_parse_is_resumable_at_every_split() {
    let value = complex_reply();
    let bytes = encode(&value);

    for split in 0..=bytes.len() {
        let mut buffer = ReadBuffer::new();
        let mut parser = Parser::new();

        buffer.append(&bytes[..split]);
        let first = parser.parse(&mut buffer).unwrap();
        if split < bytes.len() {
            assert_eq!(first, None, "complete value at split {}", split);
            assert_eq!(buffer.consumed(), 0, "consumed early at split {}", split);
            buffer.append(&bytes[split..]);
            assert_eq!(parser.parse(&mut buffer).unwrap(), Some(value.clone()));
        } else {
            assert_eq!(first, Some(value.clone()));
        }
        assert!(buffer.is_empty());
    }
}

/// Feeding one byte at a time through the decoder gives every value once.
#[test]
fn test_decoder_byte_at_a_time() {
    let mut stream = encode(&complex_reply());
    stream.extend_from_slice(b">2\r\n$7\r\nmessage\r\n$2\r\nhi\r\n:10\r\n");

    let mut decoder = StreamDecoder::new();
    let mut values = Vec::new();
    for byte in &stream {
        values.extend(decoder.push(std::slice::from_ref(byte)).unwrap());
    }

    assert_eq!(values.len(), 3);
    assert_eq!(values[0], complex_reply());
    assert!(values[1].is_push());
    assert_eq!(values[2], Value::Integer(10));
    assert_eq!(decoder.buffered(), 0);
}

/// Attributes attach to the following value and can be kept or stripped.
#[test]
fn test_attributes_attach_to_next_value() {
    let raw = b"|1\r\n+key-popularity\r\n%1\r\n$1\r\na\r\n,0.19\r\n*2\r\n:2039123\r\n:9543892\r\n";
    let values = parse_all(raw);
    assert_eq!(values.len(), 1);

    let reply = values.into_iter().next().unwrap();
    assert_eq!(reply.kind(), Kind::Array);
    assert_eq!(reply.attributes().map(|a| a.len()), Some(1));

    let plain: Vec<i64> = adapt(reply.clone()).unwrap();
    assert_eq!(plain, vec![2039123, 9543892]);

    let decorated: Attributed<Vec<i64>> = adapt(reply).unwrap();
    assert_eq!(decorated.value, vec![2039123, 9543892]);
    assert_eq!(
        decorated.attributes[0].0,
        Value::SimpleString("key-popularity".into())
    );
}

/// Typed extraction of a nested map reply.
#[test]
fn test_adapt_nested_reply() {
    let raw = b"%2\r\n+server\r\n+redis\r\n+proto\r\n:3\r\n";
    let reply = parse_all(raw).remove(0);

    let fields: KeyValues<String, Value> = adapt(reply.clone()).unwrap();
    assert_eq!(fields.0.len(), 2);
    assert_eq!(fields.0[0].0, "server");

    let map: std::collections::HashMap<String, Value> = adapt(reply).unwrap();
    assert_eq!(map["proto"], Value::Integer(3));
}

/// An error reply wins over the requested type.
#[test]
fn test_error_reply_is_server_error() {
    let reply = parse_all(b"-ERR unknown command 'FOO'\r\n").remove(0);
    match adapt::<Status>(reply) {
        Err(RespError::Server(e)) => {
            assert_eq!(e.code(), "ERR");
            assert_eq!(e.message(), "ERR unknown command 'FOO'");
        }
        other => panic!("expected server error, got {:?}", other),
    }

    let blob = parse_all(b"!21\r\nSYNTAX invalid syntax\r\n").remove(0);
    let err = adapt::<Value>(blob).unwrap_err();
    assert_eq!(err.category(), "server_error");
    assert!(!err.is_fatal());
}
