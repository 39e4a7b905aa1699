//! Connection configuration and startup.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Semaphore};

use super::driver::{Driver, DriverConfig};
use super::push::{push_channel, PushPolicy, PushReceiver, DEFAULT_PUSH_CAPACITY};
use super::reconnect::{connector, ReconnectPolicy, Reconnector};
use super::state::{ConnectionState, Control, Lifecycle};
use super::{Connection, Shared};
use crate::error::{AbortReason, RespError, Result};
use crate::protocol::{Command, ParserConfig, Value, DEFAULT_COMPACT_THRESHOLD};
use crate::transport::{self, Transport};

/// Default submission channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default cap on encoded bytes waiting to be written: 1MB.
pub const DEFAULT_MAX_UNFLUSHED_BYTES: usize = 1024 * 1024;

/// Default bytes reserved per transport read: 16KB.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 16 * 1024;

/// Configuration for a connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Submissions that can queue for the drive loop before `send` waits.
    pub channel_capacity: usize,
    /// Unwritten bytes above which the drive loop stops taking submissions.
    pub max_unflushed_bytes: usize,
    /// Maximum replies outstanding at once. `None` is unbounded.
    pub max_inflight: Option<usize>,
    /// How long a caller waits for its reply. `None` waits forever.
    pub request_timeout: Option<Duration>,
    /// Push channel capacity.
    pub push_capacity: usize,
    /// Behaviour when the push channel is full.
    pub push_policy: PushPolicy,
    /// Spare capacity reserved for each transport read.
    pub read_chunk_size: usize,
    /// Consumed bytes kept in the read buffer before compacting.
    pub compact_threshold: usize,
    /// Parser limits.
    pub parser: ParserConfig,
    /// Reconnect after a fault. Only used by connections opened with a
    /// connector.
    pub reconnect: Option<ReconnectPolicy>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_unflushed_bytes: DEFAULT_MAX_UNFLUSHED_BYTES,
            max_inflight: None,
            request_timeout: None,
            push_capacity: DEFAULT_PUSH_CAPACITY,
            push_policy: PushPolicy::default(),
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            parser: ParserConfig::default(),
            reconnect: None,
        }
    }
}

/// Builder for configuring and opening a connection.
///
/// # Example
///
/// ```ignore
/// use resp3_client::{Command, ConnectionBuilder};
///
/// let (conn, pushes) = ConnectionBuilder::new()
///     .setup(Command::new("HELLO").arg(3))
///     .request_timeout(Duration::from_secs(2))
///     .connect_tcp("127.0.0.1:6379")
///     .await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConnectionBuilder {
    config: ConnectionConfig,
    setup: Vec<Command>,
}

impl ConnectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn with_config(config: ConnectionConfig) -> Self {
        Self {
            config,
            setup: Vec::new(),
        }
    }

    /// Set the submission channel capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Set the unflushed byte limit for write backpressure.
    ///
    /// Default: 1MB
    pub fn max_unflushed_bytes(mut self, limit: usize) -> Self {
        self.config.max_unflushed_bytes = limit;
        self
    }

    /// Limit how many replies may be outstanding at once. Further sends wait
    /// for a reply to arrive.
    ///
    /// Default: unbounded
    pub fn max_inflight(mut self, limit: usize) -> Self {
        self.config.max_inflight = Some(limit);
        self
    }

    /// Give up waiting for a reply after `timeout`. The command stays in the
    /// pipeline and its reply is discarded when it arrives.
    ///
    /// Default: none
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    /// Set the push channel capacity.
    ///
    /// Default: 1024
    pub fn push_capacity(mut self, capacity: usize) -> Self {
        self.config.push_capacity = capacity;
        self
    }

    /// Set the push overflow policy.
    ///
    /// Default: [`PushPolicy::DropNewest`]
    pub fn push_policy(mut self, policy: PushPolicy) -> Self {
        self.config.push_policy = policy;
        self
    }

    /// Set the spare capacity reserved per transport read.
    ///
    /// Default: 16KB
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.config.read_chunk_size = size;
        self
    }

    /// Set parser limits.
    pub fn parser_config(mut self, parser: ParserConfig) -> Self {
        self.config.parser = parser;
        self
    }

    /// Reconnect after a fault, following `policy`. Requires a connector:
    /// [`open_with`](Self::open_with), [`connect_tcp`](Self::connect_tcp) or
    /// [`connect_unix`](Self::connect_unix). Setup commands run again on
    /// every new transport.
    ///
    /// Default: none, a fault closes the connection
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.config.reconnect = Some(policy);
        self
    }

    /// Queue a command to run before the connection becomes ready, such as
    /// `HELLO 3`, `AUTH` or `SELECT`. Setup commands run in order; an error
    /// reply fails `open`.
    pub fn setup(mut self, command: Command) -> Self {
        self.setup.push(command);
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Open a connection over an already established transport.
    ///
    /// This will:
    /// 1. Spawn the drive loop (state `connecting`)
    /// 2. Run setup commands in order
    /// 3. Move to `ready`
    pub async fn open<T: Transport>(self, transport: T) -> Result<(Connection, PushReceiver)> {
        self.start(transport, None).await
    }

    /// Open a connection over transports produced by `connect`.
    ///
    /// `connect` runs once now. With a [`reconnect`](Self::reconnect) policy
    /// it runs again for every reconnection attempt.
    pub async fn open_with<T, F, Fut>(self, connect: F) -> Result<(Connection, PushReceiver)>
    where
        T: Transport,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let connect = connector(connect);
        let transport = connect().await?;
        let reconnector = self.config.reconnect.map(|policy| Reconnector {
            connect,
            policy,
            setup: self.setup.clone(),
        });
        self.start(transport, reconnector).await
    }

    async fn start<T: Transport>(
        self,
        transport: T,
        reconnector: Option<Reconnector<T>>,
    ) -> Result<(Connection, PushReceiver)> {
        let config = self.config;

        let (submit_tx, submit_rx) = mpsc::channel(config.channel_capacity.max(1));
        let (control_tx, control_rx) = watch::channel(Control::Run);
        let (lifecycle_tx, _) = watch::channel(Lifecycle::new(ConnectionState::Disconnected));
        let lifecycle = Arc::new(lifecycle_tx);
        let (push_tx, push_rx) = push_channel(config.push_capacity, config.push_policy);
        let inflight = config
            .max_inflight
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));

        let driver = Driver::new(
            transport,
            submit_rx,
            control_rx,
            lifecycle.clone(),
            push_tx,
            inflight.clone(),
            reconnector,
            DriverConfig {
                max_unflushed_bytes: config.max_unflushed_bytes,
                read_chunk_size: config.read_chunk_size,
                compact_threshold: config.compact_threshold,
                parser: config.parser,
            },
        );

        lifecycle.send_modify(|l| l.state = ConnectionState::Connecting);
        tokio::spawn(driver.run());

        let connection = Connection {
            shared: Arc::new(Shared {
                submissions: submit_tx,
                control: control_tx,
                lifecycle,
                inflight,
                max_inflight: config.max_inflight,
                request_timeout: config.request_timeout,
            }),
        };

        for command in self.setup {
            tracing::debug!(
                "Running setup command {}",
                String::from_utf8_lossy(command.name())
            );
            if let Err(e) = connection.send_unchecked::<Value>(command).await {
                tracing::warn!("Setup command failed: {}", e);
                connection.close().await;
                return Err(e);
            }
        }

        let became_ready = connection.shared.lifecycle.send_if_modified(|l| {
            if l.state == ConnectionState::Connecting {
                l.state = ConnectionState::Ready;
                true
            } else {
                false
            }
        });
        if !became_ready {
            let state = connection.state();
            return Err(connection
                .last_error()
                .unwrap_or_else(|| RespError::aborted(AbortReason::for_state(state))));
        }

        tracing::debug!("Connection ready");
        Ok((connection, push_rx))
    }

    /// Connect over TCP, then [`open`](Self::open). Reconnection dials the
    /// same address again.
    pub async fn connect_tcp(self, addr: impl Into<String>) -> Result<(Connection, PushReceiver)> {
        let addr: Arc<str> = Arc::from(addr.into());
        self.open_with(move || {
            let addr = addr.clone();
            async move { transport::connect_tcp(&*addr).await }
        })
        .await
    }

    /// Connect over a Unix Domain Socket, then [`open`](Self::open).
    #[cfg(unix)]
    pub async fn connect_unix(
        self,
        path: impl AsRef<std::path::Path>,
    ) -> Result<(Connection, PushReceiver)> {
        let path: Arc<std::path::Path> = Arc::from(path.as_ref());
        self.open_with(move || {
            let path = path.clone();
            async move { transport::connect_unix(&*path).await }
        })
        .await
    }
}
