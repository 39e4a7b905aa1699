//! Stream acquisition helpers.
//!
//! - TCP (all platforms), with `TCP_NODELAY` set since pipelined commands
//!   are small and latency bound
//! - Unix: Unix Domain Socket
//! - Windows: Named Pipe client
//!
//! # Example
//!
//! ```ignore
//! use resp3_client::transport::connect_tcp;
//!
//! let stream = connect_tcp("127.0.0.1:6379").await?;
//! ```

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::error::Result;

/// A duplex byte stream the connection can drive.
///
/// Implemented for everything that is `AsyncRead + AsyncWrite`, so TLS
/// streams and in-memory pipes work as well as sockets.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Connect over TCP with Nagle's algorithm disabled.
pub async fn connect_tcp<A: ToSocketAddrs>(addr: A) -> Result<TcpStream> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    tracing::debug!("Connected to {:?}", stream.peer_addr().ok());
    Ok(stream)
}

// ============================================================================
// Unix Implementation
// ============================================================================

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use std::path::Path;
    use tokio::net::UnixStream;

    /// Connect to a Unix Domain Socket, e.g. `/var/run/redis.sock`.
    pub async fn connect_unix(path: impl AsRef<Path>) -> Result<UnixStream> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).await?;
        tracing::debug!("Connected to {}", path.display());
        Ok(stream)
    }
}

// ============================================================================
// Windows Implementation
// ============================================================================

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeClient};

    /// Connect to a Named Pipe, e.g. `\\.\pipe\redis`.
    pub async fn connect_named_pipe(path: &str) -> Result<NamedPipeClient> {
        let client = ClientOptions::new().open(path)?;
        tracing::debug!("Connected to {}", path);
        Ok(client)
    }
}

#[cfg(unix)]
pub use unix_impl::connect_unix;

#[cfg(windows)]
pub use windows_impl::connect_named_pipe;
