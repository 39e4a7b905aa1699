//! Pipelined connection.
//!
//! A [`Connection`] is a cheap, cloneable handle to one drive loop task. Any
//! number of tasks can call [`send`](Connection::send) concurrently; each
//! call encodes its command, hands the bytes and a pending slot to the drive
//! loop as one unit, and waits for its own reply.
//!
//! # Example
//!
//! ```ignore
//! use resp3_client::{Command, ConnectionBuilder, Status};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (conn, _pushes) = ConnectionBuilder::new()
//!         .setup(Command::new("HELLO").arg(3))
//!         .connect_tcp("127.0.0.1:6379")
//!         .await?;
//!
//!     let status: Status = conn.send(Command::new("SET").arg("k").arg("v")).await?;
//!     let value: String = conn.send(Command::new("GET").arg("k")).await?;
//!
//!     conn.close().await;
//!     Ok(())
//! }
//! ```

mod builder;
mod driver;
mod push;
mod reconnect;
mod state;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::Instrument;

use crate::adapter::FromResp;
use crate::error::{AbortReason, RespError, Result};
use crate::pipeline::PendingSlot;
use crate::protocol::{Batch, Command};
use crate::response::{settle, ResponseBundle};

use driver::Submission;
use state::{Control, Lifecycle};

pub use builder::{
    ConnectionBuilder, ConnectionConfig, DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_UNFLUSHED_BYTES,
    DEFAULT_READ_CHUNK_SIZE,
};
pub use push::{PushPolicy, PushReceiver, DEFAULT_PUSH_CAPACITY};
pub use reconnect::{ReconnectPolicy, DEFAULT_MAX_RECONNECT_DELAY, DEFAULT_RECONNECT_DELAY};
pub use state::ConnectionState;

/// State shared by every handle of one connection.
#[derive(Debug)]
struct Shared {
    submissions: mpsc::Sender<Submission>,
    control: watch::Sender<Control>,
    lifecycle: Arc<watch::Sender<Lifecycle>>,
    inflight: Option<Arc<Semaphore>>,
    max_inflight: Option<usize>,
    request_timeout: Option<Duration>,
}

/// Handle to a running connection.
///
/// Dropping the last handle drains the connection: replies already in
/// flight are read and discarded, then the transport is shut down.
#[derive(Debug, Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Create a new connection builder.
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// Send one command and wait for its reply as `T`.
    ///
    /// An error reply from the server comes back as
    /// [`RespError::Server`] whatever `T` is.
    pub async fn send<T: FromResp>(&self, command: Command) -> Result<T> {
        self.ensure_ready()?;
        let span = tracing::debug_span!(
            "request",
            command = %String::from_utf8_lossy(command.name())
        );
        self.send_unchecked(command).instrument(span).await
    }

    /// Send a batch in one write and collect a fixed-arity tuple of results.
    ///
    /// The batch must hold exactly `B::ARITY` commands.
    pub async fn send_batch<B: ResponseBundle>(&self, batch: Batch) -> Result<B> {
        if batch.len() != B::ARITY {
            return Err(RespError::InvalidBatch {
                expected: B::ARITY,
                got: batch.len(),
            });
        }
        self.ensure_ready()?;

        let (wire, count) = batch.into_parts();
        let (slots, receivers) = B::slots();
        async move {
            self.submit(wire, slots).await?;
            self.wait(async move { Ok(B::collect(receivers).await) })
                .await
        }
        .instrument(tracing::debug_span!("batch", commands = count))
        .await
    }

    /// Send a batch in one write, every reply converted to `T`.
    pub async fn send_all<T: FromResp>(&self, batch: Batch) -> Result<Vec<Result<T>>> {
        self.ensure_ready()?;
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let (wire, count) = batch.into_parts();
        let (slots, receivers): (Vec<_>, Vec<_>) =
            (0..count).map(|_| PendingSlot::typed::<T>()).unzip();
        async move {
            self.submit(wire, slots).await?;
            self.wait(async move {
                let mut results = Vec::with_capacity(receivers.len());
                for rx in receivers {
                    results.push(settle(rx.await));
                }
                Ok(results)
            })
            .await
        }
        .instrument(tracing::debug_span!("batch", commands = count))
        .await
    }

    /// Like [`send`](Self::send), but give up when `cancel` completes first.
    ///
    /// Cancelling does not take the command back off the wire; its reply is
    /// still consumed in order and then discarded.
    pub async fn send_until<T, F>(&self, command: Command, cancel: F) -> Result<T>
    where
        T: FromResp,
        F: Future<Output = ()>,
    {
        tokio::select! {
            reply = self.send::<T>(command) => reply,
            _ = cancel => Err(RespError::aborted(AbortReason::Cancelled)),
        }
    }

    /// Close now. Pending requests fail with `operation_aborted`.
    ///
    /// Idempotent; returns once the connection is closed.
    pub async fn close(&self) {
        let _ = self.shared.control.send(Control::Close);
        self.closed().await;
    }

    /// Stop accepting requests, wait for replies to everything in flight,
    /// then close.
    pub async fn drain(&self) {
        let _ = self.shared.control.send(Control::Drain);
        self.closed().await;
    }

    /// Wait until the connection reaches `closed`.
    pub async fn closed(&self) {
        let mut lifecycle = self.shared.lifecycle.subscribe();
        let _ = lifecycle
            .wait_for(|l| l.state == ConnectionState::Closed)
            .await;
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lifecycle.borrow().state
    }

    /// The fatal error that ended the connection, if it faulted.
    pub fn last_error(&self) -> Option<RespError> {
        self.shared.lifecycle.borrow().fault.clone()
    }

    /// Send without the readiness check. Used for setup commands.
    pub(crate) async fn send_unchecked<T: FromResp>(&self, command: Command) -> Result<T> {
        let (slot, rx) = PendingSlot::typed::<T>();
        self.submit(command.to_bytes(), vec![slot]).await?;
        self.wait(async move { settle(rx.await) }).await
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state() {
            ConnectionState::Ready => Ok(()),
            state => Err(RespError::aborted(AbortReason::for_state(state))),
        }
    }

    fn rejected(&self) -> RespError {
        RespError::aborted(AbortReason::for_state(self.state()))
    }

    /// Hand encoded bytes and their slots to the drive loop as one unit.
    async fn submit(&self, wire: Bytes, mut slots: Vec<PendingSlot>) -> Result<()> {
        if let (Some(inflight), Some(limit)) = (&self.shared.inflight, self.shared.max_inflight) {
            // A batch larger than the limit takes every permit.
            let wanted = slots.len().min(limit.max(1)) as u32;
            let permit = inflight
                .clone()
                .acquire_many_owned(wanted)
                .await
                .map_err(|_| self.rejected())?;
            if let Some(last) = slots.last_mut() {
                last.attach_permit(permit);
            }
        }

        self.shared
            .submissions
            .send(Submission { wire, slots })
            .await
            .map_err(|_| self.rejected())
    }

    /// Wait for a reply, bounded by the request timeout if one is set.
    async fn wait<T>(&self, reply: impl Future<Output = Result<T>>) -> Result<T> {
        tracing::debug!("Request submitted");
        let started = Instant::now();
        let result = match self.shared.request_timeout {
            Some(limit) => tokio::time::timeout(limit, reply)
                .await
                .unwrap_or(Err(RespError::Timeout(limit))),
            None => reply.await,
        };
        match &result {
            Ok(_) => tracing::debug!(elapsed = ?started.elapsed(), "Request finished"),
            Err(e) => tracing::debug!(elapsed = ?started.elapsed(), error = %e, "Request failed"),
        }
        result
    }
}
