//! Command encoding.
//!
//! A [`Command`] is an ordered list of binary-safe arguments, written on the
//! wire as an array of blob strings:
//!
//! ```text
//! *3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n
//! ```
//!
//! A [`Batch`] appends several encoded commands into one buffer so they go
//! out in a single transport write. Nothing here validates what a command
//! means.
//!
//! [`encode_value`] writes any [`Value`] in RESP3 form, which is what a
//! server (or a test double) would send back.

use std::fmt::Write as _;

use bytes::{BufMut, Bytes, BytesMut};

use super::kind::Kind;
use super::value::Value;

/// Conversion into a single command argument.
pub trait ToArg {
    fn to_arg(self) -> Bytes;
}

impl ToArg for Bytes {
    fn to_arg(self) -> Bytes {
        self
    }
}

impl ToArg for &Bytes {
    fn to_arg(self) -> Bytes {
        self.clone()
    }
}

impl ToArg for &str {
    fn to_arg(self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for String {
    fn to_arg(self) -> Bytes {
        Bytes::from(self)
    }
}

impl ToArg for &String {
    fn to_arg(self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for &[u8] {
    fn to_arg(self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl<const N: usize> ToArg for &[u8; N] {
    fn to_arg(self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl ToArg for Vec<u8> {
    fn to_arg(self) -> Bytes {
        Bytes::from(self)
    }
}

macro_rules! impl_to_arg_display {
    ($($t:ty),* $(,)?) => {
        $(
            impl ToArg for $t {
                fn to_arg(self) -> Bytes {
                    Bytes::from(self.to_string())
                }
            }
        )*
    };
}

impl_to_arg_display!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

/// A command ready to be encoded.
///
/// # Example
///
/// ```ignore
/// use resp3_client::protocol::Command;
///
/// let cmd = Command::new("SET").arg("key").arg("value").arg("EX").arg(60);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<Bytes>,
}

impl Command {
    /// Start a command with its name as the first argument.
    pub fn new(name: impl ToArg) -> Self {
        Self {
            args: vec![name.to_arg()],
        }
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl ToArg) -> Self {
        self.args.push(arg.to_arg());
        self
    }

    /// Append an argument in place.
    pub fn push_arg(&mut self, arg: impl ToArg) -> &mut Self {
        self.args.push(arg.to_arg());
        self
    }

    /// Append every argument from an iterator.
    pub fn args_from<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: ToArg,
    {
        self.args.extend(args.into_iter().map(ToArg::to_arg));
        self
    }

    /// The first argument.
    pub fn name(&self) -> &[u8] {
        &self.args[0]
    }

    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Number of arguments, including the name.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Always `false`: a command has at least its name.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Exact number of bytes `encode_into` will write.
    pub fn encoded_len(&self) -> usize {
        let body: usize = self
            .args
            .iter()
            .map(|a| header_len(a.len()) + a.len() + 2)
            .sum();
        header_len(self.args.len()) + body
    }

    /// Encode as an array of blob strings onto `out`.
    pub fn encode_into(&self, out: &mut BytesMut) {
        out.reserve(self.encoded_len());
        encode_command(&self.args, out);
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.encoded_len());
        encode_command(&self.args, &mut out);
        out.freeze()
    }

    /// The value a server parses this command as.
    pub fn to_value(&self) -> Value {
        Value::Array(self.args.iter().cloned().map(Value::BlobString).collect())
    }
}

/// Several commands encoded back to back, sent in one write.
///
/// # Example
///
/// ```ignore
/// use resp3_client::protocol::{Batch, Command};
///
/// let batch = Batch::new()
///     .command(Command::new("SET").arg("k").arg("v"))
///     .command(Command::new("GET").arg("k"));
/// assert_eq!(batch.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Batch {
    wire: BytesMut,
    count: usize,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command, builder style.
    pub fn command(mut self, command: Command) -> Self {
        self.push(&command);
        self
    }

    /// Append a command in place.
    pub fn push(&mut self, command: &Command) -> &mut Self {
        command.encode_into(&mut self.wire);
        self.count += 1;
        self
    }

    /// Number of commands in the batch.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Encoded bytes of every command so far.
    pub fn wire(&self) -> &[u8] {
        &self.wire
    }

    pub(crate) fn into_parts(self) -> (Bytes, usize) {
        (self.wire.freeze(), self.count)
    }
}

impl FromIterator<Command> for Batch {
    fn from_iter<I: IntoIterator<Item = Command>>(iter: I) -> Self {
        let mut batch = Batch::new();
        for command in iter {
            batch.push(&command);
        }
        batch
    }
}

impl From<Command> for Batch {
    fn from(command: Command) -> Self {
        Batch::new().command(command)
    }
}

/// Encode raw arguments as an array of blob strings.
pub fn encode_command(args: &[Bytes], out: &mut BytesMut) {
    put_header(out, b'*', args.len());
    for arg in args {
        put_blob(out, b'$', arg);
    }
}

/// Encode any value in RESP3 form. Attributes are written before the value
/// they decorate.
pub fn encode_value(value: &Value, out: &mut BytesMut) {
    match value {
        Value::Null => out.put_slice(b"_\r\n"),
        Value::Boolean(true) => out.put_slice(b"#t\r\n"),
        Value::Boolean(false) => out.put_slice(b"#f\r\n"),
        Value::Integer(i) => put_line(out, b':', format_args!("{}", i)),
        Value::Double(d) => {
            if d.is_nan() {
                out.put_slice(b",nan\r\n");
            } else if d.is_infinite() {
                let line: &[u8] = if *d > 0.0 { b",inf\r\n" } else { b",-inf\r\n" };
                out.put_slice(line);
            } else {
                put_line(out, b',', format_args!("{}", d));
            }
        }
        Value::BigNumber(n) => put_line(out, b'(', format_args!("{}", n)),
        Value::SimpleString(s) => put_line(out, b'+', format_args!("{}", s)),
        Value::SimpleError(s) => put_line(out, b'-', format_args!("{}", s)),
        Value::BlobString(b) => put_blob(out, b'$', b),
        Value::BlobError(b) => put_blob(out, b'!', b),
        Value::VerbatimString { format, data } => {
            put_header(out, b'=', format.len() + 1 + data.len());
            out.put_slice(format.as_bytes());
            out.put_u8(b':');
            out.put_slice(data);
            out.put_slice(b"\r\n");
        }
        Value::Array(items) | Value::Set(items) | Value::Push(items) => {
            put_header(out, value.kind().sigil(), items.len());
            for item in items {
                encode_value(item, out);
            }
        }
        Value::Map(pairs) => encode_pairs(Kind::Map, pairs, out),
        Value::Attributed { attributes, value } => {
            encode_pairs(Kind::Attribute, attributes, out);
            encode_value(value, out);
        }
    }
}

fn encode_pairs(kind: Kind, pairs: &[(Value, Value)], out: &mut BytesMut) {
    put_header(out, kind.sigil(), pairs.len());
    for (key, value) in pairs {
        encode_value(key, out);
        encode_value(value, out);
    }
}

fn put_header(out: &mut BytesMut, sigil: u8, len: usize) {
    put_line(out, sigil, format_args!("{}", len));
}

fn put_blob(out: &mut BytesMut, sigil: u8, payload: &[u8]) {
    put_header(out, sigil, payload.len());
    out.put_slice(payload);
    out.put_slice(b"\r\n");
}

fn put_line(out: &mut BytesMut, sigil: u8, body: std::fmt::Arguments<'_>) {
    out.put_u8(sigil);
    // Writing into a BytesMut only fails on allocation failure, which aborts.
    let _ = out.write_fmt(body);
    out.put_slice(b"\r\n");
}

/// Bytes taken by a `<sigil><decimal>\r\n` header.
fn header_len(n: usize) -> usize {
    let mut digits = 1;
    let mut rest = n / 10;
    while rest > 0 {
        digits += 1;
        rest /= 10;
    }
    1 + digits + 2
}
