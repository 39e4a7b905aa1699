//! Error types for resp3-client.
//!
//! Every failure a caller can observe falls into one of five categories:
//!
//! - **protocol** - malformed bytes on the wire. Fatal for the connection.
//! - **type mismatch** - a reply could not be converted into the requested
//!   type. Local to that one reply.
//! - **server** - the reply itself was a `simple_error` or `blob_error`.
//!   Delivered to the issuing caller, never fatal.
//! - **transport** - the byte stream failed. Fatal, fails every pending reply.
//! - **operation aborted** - the request was cancelled, or rejected because
//!   the connection is no longer accepting work.
//!
//! [`RespError`] is `Clone` so a single fatal error can be fanned out to
//! every caller that was waiting when the connection went down.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

use crate::adapter::AdapterError;
use crate::connection::ConnectionState;

/// Main error type for all client operations.
#[derive(Debug, Clone, Error)]
pub enum RespError {
    /// Malformed input from the server.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A reply could not be adapted into the requested type.
    #[error("type mismatch: {0}")]
    TypeMismatch(#[from] AdapterError),

    /// The server answered with an error reply.
    #[error("server error: {0}")]
    Server(#[from] ServerError),

    /// I/O failure on the underlying byte stream.
    #[error("transport error: {0}")]
    Transport(Arc<io::Error>),

    /// The request was cancelled or the connection refused it.
    #[error("operation aborted: {0}")]
    OperationAborted(AbortReason),

    /// No reply arrived within the configured request timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// A batch did not hold the number of commands the response type expects.
    #[error("batch holds {got} commands but the response expects {expected}")]
    InvalidBatch { expected: usize, got: usize },
}

impl From<io::Error> for RespError {
    fn from(err: io::Error) -> Self {
        RespError::Transport(Arc::new(err))
    }
}

impl RespError {
    /// Whether this error takes the whole connection down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RespError::Protocol(_) | RespError::Transport(_))
    }

    /// Stable category name, handy for metrics labels and log fields.
    pub fn category(&self) -> &'static str {
        match self {
            RespError::Protocol(_) => "protocol_error",
            RespError::TypeMismatch(_) => "type_mismatch",
            RespError::Server(_) => "server_error",
            RespError::Transport(_) => "transport_error",
            RespError::OperationAborted(_) | RespError::Timeout(_) => "operation_aborted",
            RespError::InvalidBatch { .. } => "invalid_batch",
        }
    }

    /// The server error carried by this error, if any.
    pub fn as_server_error(&self) -> Option<&ServerError> {
        match self {
            RespError::Server(err) => Some(err),
            _ => None,
        }
    }

    pub(crate) fn aborted(reason: AbortReason) -> Self {
        RespError::OperationAborted(reason)
    }
}

/// Why a request was aborted without a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AbortReason {
    /// The connection was closed, explicitly or after draining.
    #[error("connection closed")]
    Closed,

    /// The connection is not in a state that accepts requests.
    #[error("connection is {0}")]
    NotReady(ConnectionState),

    /// The connection failed with a fatal error before the reply arrived.
    #[error("connection faulted")]
    Faulted,

    /// The caller gave up waiting.
    #[error("cancelled by caller")]
    Cancelled,
}

impl AbortReason {
    /// Reason to report for a send attempted in `state`.
    pub(crate) fn for_state(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Faulted => AbortReason::Faulted,
            ConnectionState::Closed => AbortReason::Closed,
            other => AbortReason::NotReady(other),
        }
    }
}

/// Which wire form an error reply arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerErrorKind {
    /// `-` simple error.
    Simple,
    /// `!` blob error.
    Blob,
}

/// An error reply sent by the server, e.g. `-ERR unknown command`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    kind: ServerErrorKind,
    message: String,
}

impl ServerError {
    /// Build from a simple error line.
    pub fn simple(message: impl Into<String>) -> Self {
        Self {
            kind: ServerErrorKind::Simple,
            message: message.into(),
        }
    }

    /// Build from a blob error payload. Non UTF-8 bytes are replaced.
    pub fn blob(payload: &Bytes) -> Self {
        Self {
            kind: ServerErrorKind::Blob,
            message: String::from_utf8_lossy(payload).into_owned(),
        }
    }

    pub fn kind(&self) -> ServerErrorKind {
        self.kind
    }

    /// Full error text as sent by the server.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Leading error code, e.g. `ERR`, `WRONGTYPE`, `NOAUTH`.
    pub fn code(&self) -> &str {
        self.message.split_whitespace().next().unwrap_or("")
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ServerError {}

/// Malformed input detected by the parser, with the stream offset where the
/// offending element starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at byte {offset}")]
pub struct ProtocolError {
    /// What was wrong.
    pub kind: ProtocolErrorKind,
    /// Offset from the start of the stream of the element that failed.
    pub offset: u64,
}

impl ProtocolError {
    pub fn new(kind: ProtocolErrorKind, offset: u64) -> Self {
        Self { kind, offset }
    }
}

/// Specific protocol violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolErrorKind {
    #[error("unknown type byte 0x{0:02x}")]
    UnknownSigil(u8),

    #[error("invalid length or count")]
    InvalidLength,

    #[error("invalid integer")]
    InvalidInteger,

    #[error("invalid double")]
    InvalidDouble,

    #[error("invalid boolean")]
    InvalidBoolean,

    #[error("null carries a payload")]
    InvalidNull,

    #[error("invalid big number")]
    InvalidBigNumber,

    #[error("verbatim string without a format prefix")]
    InvalidVerbatim,

    #[error("missing CRLF terminator")]
    MissingCrlf,

    #[error("line is not valid UTF-8")]
    InvalidUtf8,

    #[error("blob of {len} bytes exceeds the {max} byte limit")]
    BlobTooLarge { len: usize, max: usize },

    #[error("line longer than {max} bytes")]
    LineTooLong { max: usize },

    #[error("nesting deeper than {max} levels")]
    NestingTooDeep { max: usize },

    #[error("reply arrived with no request waiting for it")]
    UnsolicitedReply,
}

/// Result type alias using RespError.
pub type Result<T> = std::result::Result<T, RespError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_code() {
        let err = ServerError::simple("WRONGTYPE Operation against a key holding the wrong kind");
        assert_eq!(err.code(), "WRONGTYPE");
        assert_eq!(err.kind(), ServerErrorKind::Simple);

        let err = ServerError::blob(&Bytes::from_static(b"SYNTAX invalid syntax"));
        assert_eq!(err.code(), "SYNTAX");
        assert_eq!(err.message(), "SYNTAX invalid syntax");
    }

    #[test]
    fn test_categories() {
        let io_err: RespError = io::Error::new(io::ErrorKind::BrokenPipe, "gone").into();
        assert_eq!(io_err.category(), "transport_error");
        assert!(io_err.is_fatal());

        let proto: RespError = ProtocolError::new(ProtocolErrorKind::InvalidLength, 3).into();
        assert_eq!(proto.category(), "protocol_error");
        assert!(proto.is_fatal());

        let server: RespError = ServerError::simple("ERR nope").into();
        assert!(!server.is_fatal());
        assert_eq!(server.as_server_error().map(|e| e.code()), Some("ERR"));

        let aborted = RespError::aborted(AbortReason::Cancelled);
        assert_eq!(aborted.category(), "operation_aborted");
    }

    #[test]
    fn test_abort_reason_for_state() {
        assert_eq!(
            AbortReason::for_state(ConnectionState::Faulted),
            AbortReason::Faulted
        );
        assert_eq!(
            AbortReason::for_state(ConnectionState::Closed),
            AbortReason::Closed
        );
        assert_eq!(
            AbortReason::for_state(ConnectionState::Draining),
            AbortReason::NotReady(ConnectionState::Draining)
        );
    }

    #[test]
    fn test_display() {
        let err = ProtocolError::new(ProtocolErrorKind::UnknownSigil(b'@'), 12);
        assert_eq!(err.to_string(), "unknown type byte 0x40 at byte 12");

        let err = RespError::InvalidBatch {
            expected: 2,
            got: 3,
        };
        assert_eq!(
            err.to_string(),
            "batch holds 3 commands but the response expects 2"
        );
    }
}
