//! Automatic reconnection after a runtime fault.
//!
//! When a ready connection faults, everything in flight on the broken
//! transport is failed first. If a [`ReconnectPolicy`] and a connector are
//! configured, the drive loop then asks the connector for a fresh transport,
//! replays the setup commands on it and returns to `ready`. Requests are never
//! carried over from one transport to the next.
//!
//! ```text
//! ready -> faulted --(backoff)--> reconnecting -> ready
//!             ^                        |
//!             +-------(failed)---------+
//! ```

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;

use super::state::Control;
use crate::error::Result;
use crate::protocol::{Command, Parser, ParserConfig, ReadBuffer, Value};
use crate::response::BoxFuture;
use crate::transport::Transport;

/// Default delay before the first backed-off attempt: 100ms.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(100);

/// Default ceiling on the backoff delay: 30s.
pub const DEFAULT_MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// When and how often to re-establish a faulted connection.
///
/// The first `immediate_attempts` attempts run back to back. After that the
/// delay starts at `initial_delay` and doubles on every failure, capped at
/// `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub immediate_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Give up after this many failed attempts. `None` retries until the
    /// connection is closed.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            immediate_attempts: 1,
            initial_delay: DEFAULT_RECONNECT_DELAY,
            max_delay: DEFAULT_MAX_RECONNECT_DELAY,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before attempt number `attempt`, counting from zero.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt < self.immediate_attempts {
            return Duration::ZERO;
        }
        let doublings = (attempt - self.immediate_attempts).min(31);
        self.initial_delay
            .checked_mul(1u32 << doublings)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Whether attempt number `attempt` may run.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }
}

/// Produces a fresh transport for each attempt.
pub(crate) type Connector<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

pub(crate) fn connector<T, F, Fut>(connect: F) -> Connector<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    Arc::new(move || Box::pin(connect()))
}

/// Everything the drive loop needs to bring a connection back.
pub(crate) struct Reconnector<T> {
    pub connect: Connector<T>,
    pub policy: ReconnectPolicy,
    pub setup: Vec<Command>,
}

impl<T> Clone for Reconnector<T> {
    fn clone(&self) -> Self {
        Self {
            connect: self.connect.clone(),
            policy: self.policy,
            setup: self.setup.clone(),
        }
    }
}

/// A new transport that has completed its setup commands.
pub(crate) struct Established<T> {
    pub transport: T,
    /// Bytes read past the last setup reply.
    pub incoming: ReadBuffer,
    /// Pushes that arrived during setup.
    pub pushes: Vec<Value>,
}

/// Connect and run `setup` on the new transport.
pub(crate) async fn establish<T: Transport>(
    connect: &Connector<T>,
    setup: &[Command],
    parser: ParserConfig,
    read_chunk_size: usize,
    compact_threshold: usize,
) -> Result<Established<T>> {
    let mut transport = connect().await?;
    let mut incoming = ReadBuffer::with_capacity(read_chunk_size);
    incoming.set_compact_threshold(compact_threshold);
    let mut pushes = Vec::new();

    if !setup.is_empty() {
        let mut wire = BytesMut::new();
        for command in setup {
            command.encode_into(&mut wire);
        }
        transport.write_all(&wire).await?;
        transport.flush().await?;

        let mut parser = Parser::with_config(parser);
        let mut remaining = setup.len();
        while remaining > 0 {
            match parser.parse(&mut incoming)? {
                Some(value) if value.is_push() => pushes.push(value),
                Some(value) => {
                    if let Some(err) = value.server_error() {
                        return Err(err.into());
                    }
                    remaining -= 1;
                }
                None => {
                    if incoming.read_from(&mut transport, read_chunk_size).await? == 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "connection closed during setup",
                        )
                        .into());
                    }
                }
            }
        }
    }

    Ok(Established {
        transport,
        incoming,
        pushes,
    })
}

/// Resolves once a handle asks to close or drain, or every handle is gone.
pub(crate) async fn stop_requested(control: &mut watch::Receiver<Control>) {
    if *control.borrow_and_update() != Control::Run {
        return;
    }
    loop {
        if control.changed().await.is_err() {
            return;
        }
        if *control.borrow_and_update() != Control::Run {
            return;
        }
    }
}
