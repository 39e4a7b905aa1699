//! Shared helpers for connection tests: an in-memory scripted server.

#![allow(dead_code)]

use std::collections::VecDeque;

use bytes::BytesMut;
use resp3_client::protocol::{encode_value, StreamDecoder, Value};
use resp3_client::{Connection, ConnectionBuilder, PushReceiver};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

/// Server end of an in-memory transport.
pub struct FakeServer {
    stream: Option<DuplexStream>,
    decoder: StreamDecoder,
    received: VecDeque<Vec<String>>,
}

impl FakeServer {
    /// Read the next command as its argument strings. `None` on EOF.
    pub async fn next_command(&mut self) -> Option<Vec<String>> {
        loop {
            if let Some(cmd) = self.received.pop_front() {
                return Some(cmd);
            }
            let stream = self.stream.as_mut()?;
            let mut buf = [0u8; 4096];
            let n = stream.read(&mut buf).await.ok()?;
            if n == 0 {
                return None;
            }
            for value in self.decoder.push(&buf[..n]).expect("client sent bad RESP") {
                self.received.push_back(command_args(value));
            }
        }
    }

    /// Read exactly `n` commands.
    pub async fn commands(&mut self, n: usize) -> Vec<Vec<String>> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.next_command().await.expect("connection closed early"));
        }
        out
    }

    /// Write raw bytes to the client.
    pub async fn reply(&mut self, raw: &[u8]) {
        let stream = self.stream.as_mut().expect("server already hung up");
        stream.write_all(raw).await.expect("client went away");
    }

    /// Write an encoded value to the client.
    pub async fn reply_value(&mut self, value: &Value) {
        let mut out = BytesMut::new();
        encode_value(value, &mut out);
        self.reply(&out).await;
    }

    /// Drop the server end, as if the socket was reset.
    pub fn hang_up(&mut self) {
        self.stream = None;
    }
}

fn command_args(value: Value) -> Vec<String> {
    value
        .as_slice()
        .expect("commands are arrays")
        .iter()
        .map(|arg| arg.as_str().expect("utf-8 argument").to_owned())
        .collect()
}

/// An in-memory transport pair.
pub fn transport() -> (DuplexStream, FakeServer) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let server = FakeServer {
        stream: Some(server),
        decoder: StreamDecoder::new(),
        received: VecDeque::new(),
    };
    (client, server)
}

/// A ready connection over an in-memory transport with default settings.
pub async fn connect() -> (Connection, PushReceiver, FakeServer) {
    connect_with(ConnectionBuilder::new()).await
}

/// A ready connection built from `builder`. The builder must not have setup
/// commands, since nothing answers them here.
pub async fn connect_with(builder: ConnectionBuilder) -> (Connection, PushReceiver, FakeServer) {
    let (client, server) = transport();
    let (conn, pushes) = builder.open(client).await.expect("open failed");
    (conn, pushes, server)
}

pub fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}
