//! Protocol module - RESP3 values, framing and encoding.
//!
//! This module implements the wire side of the client:
//! - [`Value`] model and [`Kind`] sigil table
//! - [`ReadBuffer`] for accumulating partial reads
//! - Resumable [`Parser`] turning bytes into values
//! - [`Command`] / [`Batch`] encoding for requests

mod buffer;
mod kind;
mod parser;
mod serializer;
mod value;

pub use buffer::{ReadBuffer, DEFAULT_BUFFER_CAPACITY, DEFAULT_COMPACT_THRESHOLD};
pub use kind::Kind;
pub use parser::{
    Parser, ParserConfig, StreamDecoder, DEFAULT_MAX_BLOB_LEN, DEFAULT_MAX_DEPTH,
    DEFAULT_MAX_LINE_LEN,
};
pub use serializer::{encode_command, encode_value, Batch, Command, ToArg};
pub use value::{Pairs, Value};
