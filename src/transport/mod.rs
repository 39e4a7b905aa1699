//! Transport module - the byte stream a connection runs over.
//!
//! The connection only needs `AsyncRead + AsyncWrite`; this module provides
//! the [`Transport`] bound and helpers for:
//! - TCP sockets
//! - Unix Domain Sockets (Linux/macOS)
//! - Named Pipes (Windows)

mod stream;

pub use stream::{connect_tcp, Transport};

#[cfg(unix)]
pub use stream::connect_unix;

#[cfg(windows)]
pub use stream::connect_named_pipe;
