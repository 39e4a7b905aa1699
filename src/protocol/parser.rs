//! Incremental RESP3 parser.
//!
//! The parser turns the readable span of a [`ReadBuffer`] into complete
//! top-level [`Value`]s. Input may arrive split at any byte; containers that
//! are only partially available are tracked on an explicit frame stack so a
//! later call resumes exactly where the previous one stopped.
//!
//! Rules:
//! - The buffer's read cursor only moves when a whole top-level value
//!   (including any attribute preceding it) has been validated.
//! - On malformed input the parser records a [`ProtocolError`] carrying the
//!   stream offset of the bad element, consumes nothing, and keeps returning
//!   that error until [`Parser::reset`]. It never skips ahead to resync.
//! - Between calls nothing but the parser may consume from the buffer.
//!
//! # Example
//!
//! ```ignore
//! use resp3_client::protocol::{Parser, ReadBuffer};
//!
//! let mut buffer = ReadBuffer::new();
//! let mut parser = Parser::new();
//!
//! buffer.append(b"*2\r\n:1\r\n");
//! assert!(parser.parse(&mut buffer)?.is_none()); // need more input
//!
//! buffer.append(b":2\r\n");
//! let value = parser.parse(&mut buffer)?.unwrap();
//! ```

use bytes::Bytes;

use super::buffer::ReadBuffer;
use super::kind::Kind;
use super::value::{Pairs, Value};
use crate::error::{ProtocolError, ProtocolErrorKind};

/// Default maximum blob payload: 512MB, the server's own proto-max-bulk-len.
pub const DEFAULT_MAX_BLOB_LEN: usize = 512 * 1024 * 1024;

/// Default maximum container nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Default maximum length of a scalar or header line: 64KB.
pub const DEFAULT_MAX_LINE_LEN: usize = 64 * 1024;

/// Upper bound on elements pre-allocated from an untrusted count line.
const MAX_PREALLOC: usize = 1024;

/// Parser limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserConfig {
    /// Largest accepted blob, blob error or verbatim payload.
    pub max_blob_len: usize,
    /// Deepest accepted container nesting.
    pub max_depth: usize,
    /// Longest accepted line, excluding its CRLF. Covers simple strings,
    /// errors, numbers and length headers.
    pub max_line_len: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_blob_len: DEFAULT_MAX_BLOB_LEN,
            max_depth: DEFAULT_MAX_DEPTH,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

/// One syntactic element read from the wire.
#[derive(Debug)]
enum Element {
    /// A complete scalar or blob.
    Value(Value),
    /// A container header. `children` is the raw child count, already
    /// doubled for maps and attributes.
    Open { kind: Kind, children: usize },
}

/// An in-progress container.
#[derive(Debug)]
struct Frame {
    kind: Kind,
    remaining: usize,
    items: Vec<Value>,
    /// For data containers: attributes to attach when the frame closes.
    /// For attribute frames: attributes already pending when it opened.
    attributes: Option<Pairs>,
}

impl Frame {
    fn new(kind: Kind, children: usize, attributes: Option<Pairs>) -> Self {
        Self {
            kind,
            remaining: children,
            items: Vec::with_capacity(children.min(MAX_PREALLOC)),
            attributes,
        }
    }
}

/// Resumable RESP3 parser.
#[derive(Debug)]
pub struct Parser {
    config: ParserConfig,
    /// Open containers, innermost last.
    stack: Vec<Frame>,
    /// Bytes of the current top-level value already scanned, relative to the
    /// buffer's read cursor.
    offset: usize,
    /// Bytes of the current element's line already searched for `\n`.
    scanned: usize,
    /// Attributes waiting for the next completed value.
    pending_attributes: Option<Pairs>,
    failed: Option<ProtocolError>,
}

impl Parser {
    pub fn new() -> Self {
        Self::with_config(ParserConfig::default())
    }

    pub fn with_config(config: ParserConfig) -> Self {
        Self {
            config,
            stack: Vec::new(),
            offset: 0,
            scanned: 0,
            pending_attributes: None,
            failed: None,
        }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parse the next complete top-level value from `buffer`.
    ///
    /// Returns `Ok(None)` when more input is needed. Bytes of a returned
    /// value are consumed from the buffer; nothing is consumed otherwise.
    pub fn parse(&mut self, buffer: &mut ReadBuffer) -> Result<Option<Value>, ProtocolError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }

        loop {
            let data = &buffer.readable()[self.offset..];
            let (element, used) = match read_element(data, &self.config, &mut self.scanned) {
                Ok(Some(read)) => read,
                Ok(None) => return Ok(None),
                Err(kind) => return Err(self.fail(kind, buffer.consumed())),
            };
            self.offset += used;
            self.scanned = 0;

            let completed = match element {
                Element::Value(value) => {
                    let attributes = self.pending_attributes.take();
                    self.place(decorate(value, attributes))
                }
                Element::Open { kind, children } => {
                    if self.stack.len() >= self.config.max_depth {
                        self.offset -= used;
                        let max = self.config.max_depth;
                        return Err(
                            self.fail(ProtocolErrorKind::NestingTooDeep { max }, buffer.consumed())
                        );
                    }
                    // Attributes seen before a container belong to the
                    // container, not to its first child.
                    let frame = Frame::new(kind, children, self.pending_attributes.take());
                    if children == 0 {
                        match self.close(frame) {
                            Some(value) => self.place(value),
                            None => None,
                        }
                    } else {
                        self.stack.push(frame);
                        None
                    }
                }
            };

            if let Some(value) = completed {
                buffer.consume(self.offset);
                self.offset = 0;
                return Ok(Some(value));
            }
        }
    }

    /// Whether a protocol error has been recorded.
    pub fn is_failed(&self) -> bool {
        self.failed.is_some()
    }

    /// The recorded protocol error, if any.
    pub fn error(&self) -> Option<&ProtocolError> {
        self.failed.as_ref()
    }

    /// Number of containers currently open.
    pub fn in_progress_depth(&self) -> usize {
        self.stack.len()
    }

    /// Forget all in-progress state, including a recorded failure.
    ///
    /// The caller must also discard the buffer contents the parser had
    /// scanned; resuming on the same bytes would re-read them.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.offset = 0;
        self.scanned = 0;
        self.pending_attributes = None;
        self.failed = None;
    }

    /// Append a completed value to the innermost open container, closing
    /// every container it fills. Returns the value once it is top-level.
    fn place(&mut self, mut value: Value) -> Option<Value> {
        loop {
            let top = match self.stack.last_mut() {
                Some(top) => top,
                None => return Some(value),
            };
            top.items.push(value);
            top.remaining -= 1;
            if top.remaining > 0 {
                return None;
            }
            let frame = self.stack.pop()?;
            value = self.close(frame)?;
        }
    }

    /// Turn a filled frame into its value. Attribute frames produce no value;
    /// their pairs become pending for whatever completes next.
    fn close(&mut self, frame: Frame) -> Option<Value> {
        let Frame {
            kind,
            items,
            attributes,
            ..
        } = frame;

        let value = match kind {
            Kind::Attribute => {
                let mut merged = attributes.unwrap_or_default();
                merged.extend(into_pairs(items));
                self.pending_attributes = if merged.is_empty() { None } else { Some(merged) };
                return None;
            }
            Kind::Map => Value::Map(into_pairs(items)),
            Kind::Set => Value::Set(items),
            Kind::Push => Value::Push(items),
            _ => Value::Array(items),
        };
        Some(decorate(value, attributes))
    }

    fn fail(&mut self, kind: ProtocolErrorKind, base: u64) -> ProtocolError {
        let err = ProtocolError::new(kind, base + self.offset as u64);
        tracing::debug!("Parser failed: {}", err);
        self.stack.clear();
        self.scanned = 0;
        self.pending_attributes = None;
        self.failed = Some(err.clone());
        err
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

fn decorate(value: Value, attributes: Option<Pairs>) -> Value {
    match attributes {
        Some(attributes) => Value::with_attributes(value, attributes),
        None => value,
    }
}

fn into_pairs(items: Vec<Value>) -> Pairs {
    let mut pairs = Vec::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
        pairs.push((key, value));
    }
    pairs
}

/// Read one element at the start of `data`.
///
/// Returns the element and the number of bytes it spans, or `None` if `data`
/// does not yet hold the whole element. `scanned` carries the line search
/// position across calls.
fn read_element(
    data: &[u8],
    config: &ParserConfig,
    scanned: &mut usize,
) -> Result<Option<(Element, usize)>, ProtocolErrorKind> {
    let sigil = match data.first() {
        Some(&b) => b,
        None => return Ok(None),
    };
    let kind = Kind::from_sigil(sigil).ok_or(ProtocolErrorKind::UnknownSigil(sigil))?;

    let line_len = match find_line(&data[1..], scanned, config.max_line_len)? {
        Some(len) => len,
        None => return Ok(None),
    };
    let line = &data[1..1 + line_len];
    let header_len = 1 + line_len + 2;

    let value = match kind {
        Kind::Null => {
            if !line.is_empty() {
                return Err(ProtocolErrorKind::InvalidNull);
            }
            Value::Null
        }
        Kind::Boolean => match line {
            b"t" => Value::Boolean(true),
            b"f" => Value::Boolean(false),
            _ => return Err(ProtocolErrorKind::InvalidBoolean),
        },
        Kind::Integer => {
            Value::Integer(parse_number(line).ok_or(ProtocolErrorKind::InvalidInteger)?)
        }
        Kind::Double => Value::Double(parse_double(line)?),
        Kind::BigNumber => Value::BigNumber(parse_big_number(line)?),
        Kind::SimpleString => Value::SimpleString(utf8(line)?),
        Kind::SimpleError => Value::SimpleError(utf8(line)?),
        Kind::BlobString | Kind::BlobError | Kind::VerbatimString => {
            let len = match parse_length(line, kind)? {
                Some(len) => len,
                None => return Ok(Some((Element::Value(Value::Null), header_len))),
            };
            if len > config.max_blob_len {
                return Err(ProtocolErrorKind::BlobTooLarge {
                    len,
                    max: config.max_blob_len,
                });
            }
            let total = header_len + len + 2;
            if data.len() < total {
                return Ok(None);
            }
            if &data[header_len + len..total] != b"\r\n" {
                return Err(ProtocolErrorKind::MissingCrlf);
            }
            let payload = Bytes::copy_from_slice(&data[header_len..header_len + len]);
            let value = blob_value(kind, payload)?;
            return Ok(Some((Element::Value(value), total)));
        }
        Kind::Array | Kind::Set | Kind::Map | Kind::Push | Kind::Attribute => {
            let count = match parse_length(line, kind)? {
                Some(count) => count,
                None => return Ok(Some((Element::Value(Value::Null), header_len))),
            };
            let children = if matches!(kind, Kind::Map | Kind::Attribute) {
                count
                    .checked_mul(2)
                    .ok_or(ProtocolErrorKind::InvalidLength)?
            } else {
                count
            };
            return Ok(Some((Element::Open { kind, children }, header_len)));
        }
    };

    Ok(Some((Element::Value(value), header_len)))
}

/// Length of the line at the start of `data`, excluding its CRLF.
///
/// The search starts at `*scanned`, which is advanced past every byte known
/// to hold no `\n`. A bare `\n` is rejected rather than waited on.
fn find_line(
    data: &[u8],
    scanned: &mut usize,
    max_len: usize,
) -> Result<Option<usize>, ProtocolErrorKind> {
    let from = (*scanned).min(data.len());
    match data[from..].iter().position(|&b| b == b'\n') {
        Some(pos) => {
            let nl = from + pos;
            if nl == 0 || data[nl - 1] != b'\r' {
                return Err(ProtocolErrorKind::MissingCrlf);
            }
            if nl - 1 > max_len {
                return Err(ProtocolErrorKind::LineTooLong { max: max_len });
            }
            Ok(Some(nl - 1))
        }
        // Room for the line plus its `\r`.
        None if data.len() > max_len.saturating_add(1) => {
            Err(ProtocolErrorKind::LineTooLong { max: max_len })
        }
        None => {
            *scanned = data.len();
            Ok(None)
        }
    }
}

fn parse_number(line: &[u8]) -> Option<i64> {
    std::str::from_utf8(line).ok()?.parse().ok()
}

/// Parse a length or count line. `-1` is the null marker, kept for RESP2
/// compatibility on blob strings and arrays only.
fn parse_length(line: &[u8], kind: Kind) -> Result<Option<usize>, ProtocolErrorKind> {
    let n = parse_number(line).ok_or(ProtocolErrorKind::InvalidLength)?;
    if n == -1 && matches!(kind, Kind::BlobString | Kind::Array) {
        return Ok(None);
    }
    usize::try_from(n)
        .map(Some)
        .map_err(|_| ProtocolErrorKind::InvalidLength)
}

/// Parse a double line: `inf`, `-inf`, `nan`, or
/// `[+-]digits[.digits][(e|E)[+-]digits]`.
fn parse_double(line: &[u8]) -> Result<f64, ProtocolErrorKind> {
    match line {
        b"inf" => return Ok(f64::INFINITY),
        b"-inf" => return Ok(f64::NEG_INFINITY),
        b"nan" => return Ok(f64::NAN),
        _ => {}
    }
    if !is_decimal(line) {
        return Err(ProtocolErrorKind::InvalidDouble);
    }
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(ProtocolErrorKind::InvalidDouble)
}

fn is_decimal(line: &[u8]) -> bool {
    fn digits(s: &[u8]) -> usize {
        s.iter().take_while(|b| b.is_ascii_digit()).count()
    }
    fn sign(s: &[u8]) -> usize {
        usize::from(matches!(s.first(), Some(b'+') | Some(b'-')))
    }

    let mut i = sign(line);
    let int = digits(&line[i..]);
    if int == 0 {
        return false;
    }
    i += int;
    if line.get(i) == Some(&b'.') {
        let frac = digits(&line[i + 1..]);
        if frac == 0 {
            return false;
        }
        i += 1 + frac;
    }
    if matches!(line.get(i), Some(b'e') | Some(b'E')) {
        i += 1;
        i += sign(&line[i..]);
        let exp = digits(&line[i..]);
        if exp == 0 {
            return false;
        }
        i += exp;
    }
    i == line.len()
}

fn parse_big_number(line: &[u8]) -> Result<String, ProtocolErrorKind> {
    let digits = match line.first() {
        Some(b'-') | Some(b'+') => &line[1..],
        _ => line,
    };
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(ProtocolErrorKind::InvalidBigNumber);
    }
    utf8(line).map_err(|_| ProtocolErrorKind::InvalidBigNumber)
}

fn utf8(line: &[u8]) -> Result<String, ProtocolErrorKind> {
    std::str::from_utf8(line)
        .map(str::to_owned)
        .map_err(|_| ProtocolErrorKind::InvalidUtf8)
}

fn blob_value(kind: Kind, payload: Bytes) -> Result<Value, ProtocolErrorKind> {
    Ok(match kind {
        Kind::BlobError => Value::BlobError(payload),
        Kind::VerbatimString => {
            if payload.len() < 4 || payload[3] != b':' {
                return Err(ProtocolErrorKind::InvalidVerbatim);
            }
            let format = std::str::from_utf8(&payload[..3])
                .map_err(|_| ProtocolErrorKind::InvalidVerbatim)?
                .to_owned();
            Value::VerbatimString {
                format,
                data: payload.slice(4..),
            }
        }
        _ => Value::BlobString(payload),
    })
}

/// Buffer plus parser, for callers that just have byte chunks.
///
/// # Example
///
/// ```ignore
/// use resp3_client::protocol::StreamDecoder;
///
/// let mut decoder = StreamDecoder::new();
/// let values = decoder.push(b"+OK\r\n:1")?;
/// assert_eq!(values.len(), 1);
/// let values = decoder.push(b"\r\n")?;
/// assert_eq!(values.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: ReadBuffer,
    parser: Parser,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ParserConfig) -> Self {
        Self {
            buffer: ReadBuffer::new(),
            parser: Parser::with_config(config),
        }
    }

    /// Feed bytes and return every value that became complete.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Value>, ProtocolError> {
        self.buffer.append(data);
        let mut values = Vec::new();
        while let Some(value) = self.parser.parse(&mut self.buffer)? {
            values.push(value);
        }
        self.buffer.maybe_compact();
        Ok(values)
    }

    /// Bytes held but not yet part of a returned value.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
