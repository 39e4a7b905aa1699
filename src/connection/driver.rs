//! The drive loop: one task per connection owning the byte stream.
//!
//! # Architecture
//!
//! ```text
//! send() ─┐                                   ┌─► PushReceiver
//! send() ─┼─► mpsc<Submission> ─► Driver ─────┤
//! send() ─┘    (wire + slots)      │  ▲       └─► PendingSlot (FIFO)
//!                                  ▼  │
//!                              transport
//! ```
//!
//! Each [`Submission`] carries a batch's encoded bytes together with its
//! pending slots. The driver appends both in one step, so the order of
//! commands on the wire always equals the order of slots in the pipeline.
//! It is the only reader of the transport, which is what lets replies be
//! matched to slots by position alone.

use std::io;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, watch, Semaphore};

use super::push::PushSender;
use super::reconnect::{establish, stop_requested, Reconnector};
use super::state::{ConnectionState, Control, Lifecycle};
use crate::error::{AbortReason, ProtocolError, ProtocolErrorKind, RespError};
use crate::pipeline::{PendingSlot, Pipeline};
use crate::protocol::{Parser, ParserConfig, ReadBuffer};
use crate::transport::Transport;

/// Encoded commands and their slots, enqueued as one unit.
#[derive(Debug)]
pub(crate) struct Submission {
    pub wire: Bytes,
    pub slots: Vec<PendingSlot>,
}

/// Driver tuning, split out of the connection config.
#[derive(Debug, Clone)]
pub(crate) struct DriverConfig {
    pub max_unflushed_bytes: usize,
    pub read_chunk_size: usize,
    pub compact_threshold: usize,
    pub parser: ParserConfig,
}

/// Why the loop stopped.
enum Exit {
    /// Explicit close.
    Closed,
    /// Drain finished with nothing in flight.
    Drained,
    /// Fatal protocol or transport error.
    Fault(RespError),
}

pub(crate) struct Driver<T: Transport> {
    reader: ReadHalf<T>,
    writer: WriteHalf<T>,
    incoming: ReadBuffer,
    parser: Parser,
    outgoing: BytesMut,
    pipeline: Pipeline,
    submissions: mpsc::Receiver<Submission>,
    control: watch::Receiver<Control>,
    lifecycle: Arc<watch::Sender<Lifecycle>>,
    push: PushSender,
    inflight: Option<Arc<Semaphore>>,
    reconnector: Option<Reconnector<T>>,
    config: DriverConfig,
}

impl<T: Transport> Driver<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: T,
        submissions: mpsc::Receiver<Submission>,
        control: watch::Receiver<Control>,
        lifecycle: Arc<watch::Sender<Lifecycle>>,
        push: PushSender,
        inflight: Option<Arc<Semaphore>>,
        reconnector: Option<Reconnector<T>>,
        config: DriverConfig,
    ) -> Self {
        let (reader, writer) = tokio::io::split(transport);
        let mut incoming = ReadBuffer::with_capacity(config.read_chunk_size);
        incoming.set_compact_threshold(config.compact_threshold);
        Self {
            reader,
            writer,
            incoming,
            parser: Parser::with_config(config.parser),
            outgoing: BytesMut::with_capacity(config.read_chunk_size),
            pipeline: Pipeline::new(),
            submissions,
            control,
            lifecycle,
            push,
            inflight,
            reconnector,
            config,
        }
    }

    /// Run until closed, drained or faulted, then fail whatever is left.
    ///
    /// With a reconnector, a fault fails the requests in flight and the loop
    /// resumes on a fresh transport instead.
    pub async fn run(mut self) {
        loop {
            let exit = self.drive().await;
            let err = match exit {
                Exit::Fault(err) if self.reconnector.is_some() => err,
                exit => return self.teardown(exit).await,
            };
            let slot_error = self.publish_fault(err);
            self.fail_outstanding(&slot_error);
            if !self.reconnect().await {
                return self.teardown(Exit::Closed).await;
            }
        }
    }

    async fn drive(&mut self) -> Exit {
        let mut accepting = true;
        let mut draining = false;
        let mut control_open = true;

        loop {
            if draining && self.pipeline.is_empty() && self.outgoing.is_empty() {
                return Exit::Drained;
            }

            let can_buffer = self.outgoing.len() < self.config.max_unflushed_bytes;

            tokio::select! {
                biased;

                changed = self.control.changed(), if control_open => {
                    let control = match changed {
                        Ok(()) => *self.control.borrow_and_update(),
                        // Every handle is gone.
                        Err(_) => {
                            control_open = false;
                            Control::Drain
                        }
                    };
                    match control {
                        Control::Run => {}
                        Control::Close => return Exit::Closed,
                        Control::Drain => {
                            if !draining {
                                draining = true;
                                accepting = false;
                                self.begin_drain();
                            }
                        }
                    }
                }

                written = self.writer.write_buf(&mut self.outgoing), if !self.outgoing.is_empty() => {
                    match written {
                        Ok(0) => {
                            return Exit::Fault(
                                io::Error::new(io::ErrorKind::WriteZero, "transport accepted no bytes").into(),
                            )
                        }
                        Ok(n) => {
                            tracing::trace!("Wrote {} bytes, {} unflushed", n, self.outgoing.len());
                            if self.outgoing.is_empty() {
                                if let Err(e) = self.writer.flush().await {
                                    return Exit::Fault(e.into());
                                }
                            }
                        }
                        Err(e) => return Exit::Fault(e.into()),
                    }
                }

                submission = self.submissions.recv(), if accepting && can_buffer => {
                    match submission {
                        Some(submission) => self.enqueue(submission),
                        None => {
                            accepting = false;
                            if !draining {
                                draining = true;
                                self.begin_drain();
                            }
                        }
                    }
                }

                read = self.incoming.read_from(&mut self.reader, self.config.read_chunk_size) => {
                    match read {
                        Ok(0) => {
                            return Exit::Fault(
                                io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by server").into(),
                            )
                        }
                        Ok(n) => {
                            tracing::trace!("Read {} bytes", n);
                            if let Err(e) = self.dispatch().await {
                                return Exit::Fault(e);
                            }
                        }
                        Err(e) => return Exit::Fault(e.into()),
                    }
                }
            }
        }
    }

    /// Append a submission's bytes and slots together.
    fn enqueue(&mut self, submission: Submission) {
        let Submission { wire, slots } = submission;
        tracing::trace!("Enqueued {} commands ({} bytes)", slots.len(), wire.len());
        self.outgoing.extend_from_slice(&wire);
        self.pipeline.extend(slots);
    }

    /// Route every complete value in the incoming buffer.
    async fn dispatch(&mut self) -> Result<(), RespError> {
        loop {
            // The cursor only moves once a value completes, so this is where
            // the next value starts.
            let start = self.incoming.consumed();
            let value = match self.parser.parse(&mut self.incoming)? {
                Some(value) => value,
                None => break,
            };
            if value.is_push() {
                self.push.deliver(value).await;
                continue;
            }
            if self.pipeline.fulfill_next(value).is_err() {
                tracing::warn!("Reply arrived with no pending request");
                return Err(ProtocolError::new(ProtocolErrorKind::UnsolicitedReply, start).into());
            }
        }
        self.incoming.maybe_compact();
        Ok(())
    }

    /// Stop taking new submissions. Those already queued were accepted
    /// while ready, so they are still written and their replies awaited.
    fn begin_drain(&mut self) {
        self.lifecycle.send_if_modified(|l| {
            if matches!(l.state, ConnectionState::Ready | ConnectionState::Connecting) {
                l.state = ConnectionState::Draining;
                true
            } else {
                false
            }
        });
        self.submissions.close();
        while let Ok(submission) = self.submissions.try_recv() {
            self.enqueue(submission);
        }
        tracing::debug!("Draining with {} replies outstanding", self.pipeline.len());
    }

    /// Try to bring the connection back. Returns `false` when it should
    /// close instead: attempts ran out, or a handle asked to stop.
    async fn reconnect(&mut self) -> bool {
        let reconnector = match &self.reconnector {
            Some(reconnector) => reconnector.clone(),
            None => return false,
        };
        let policy = reconnector.policy;
        let mut attempt = 0;

        loop {
            if !policy.allows(attempt) {
                tracing::warn!("Giving up after {} reconnection attempts", attempt);
                return false;
            }
            let delay = policy.delay(attempt);
            if !delay.is_zero() {
                tracing::debug!("Reconnecting in {:?}", delay);
                tokio::select! {
                    biased;
                    _ = stop_requested(&mut self.control) => return false,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            attempt += 1;

            self.lifecycle
                .send_modify(|l| l.state = ConnectionState::Reconnecting);
            let outcome = tokio::select! {
                biased;
                _ = stop_requested(&mut self.control) => return false,
                outcome = establish(
                    &reconnector.connect,
                    &reconnector.setup,
                    self.config.parser,
                    self.config.read_chunk_size,
                    self.config.compact_threshold,
                ) => outcome,
            };

            match outcome {
                Ok(established) => {
                    let (reader, writer) = tokio::io::split(established.transport);
                    self.reader = reader;
                    self.writer = writer;
                    self.incoming = established.incoming;
                    self.parser = Parser::with_config(self.config.parser);
                    self.outgoing.clear();
                    for push in established.pushes {
                        self.push.deliver(push).await;
                    }
                    self.lifecycle
                        .send_modify(|l| l.state = ConnectionState::Ready);
                    tracing::info!("Reconnected after {} attempts", attempt);
                    return true;
                }
                Err(e) => {
                    tracing::warn!("Reconnection attempt {} failed: {}", attempt, e);
                    self.lifecycle.send_modify(|l| {
                        l.state = ConnectionState::Faulted;
                        l.fault = Some(e);
                    });
                }
            }
        }
    }

    /// Publish a fault and return the error its pending slots receive.
    ///
    /// The fault is visible before any slot fails, so a caller woken by its
    /// failure already sees the connection as faulted.
    fn publish_fault(&mut self, err: RespError) -> RespError {
        tracing::error!("Connection faulted: {}", err);
        let fault = err.clone();
        self.lifecycle.send_modify(|l| {
            l.state = ConnectionState::Faulted;
            l.fault = Some(fault);
        });
        match err {
            RespError::Transport(_) => err,
            _ => RespError::aborted(AbortReason::Faulted),
        }
    }

    /// Fail every pending slot and every queued submission.
    fn fail_outstanding(&mut self, slot_error: &RespError) {
        let failed = self.pipeline.fail_all(slot_error);
        if failed > 0 {
            tracing::debug!("Failed {} pending replies: {}", failed, slot_error);
        }

        // Anything still queued was never written.
        let unsent = match slot_error {
            RespError::Transport(_) => RespError::aborted(AbortReason::Faulted),
            other => other.clone(),
        };
        while let Ok(submission) = self.submissions.try_recv() {
            for slot in submission.slots {
                slot.fail(unsent.clone());
            }
        }
    }

    async fn teardown(mut self, exit: Exit) {
        let slot_error = match exit {
            Exit::Closed | Exit::Drained => {
                tracing::debug!("Connection closed");
                RespError::aborted(AbortReason::Closed)
            }
            Exit::Fault(err) => self.publish_fault(err),
        };

        self.submissions.close();
        self.fail_outstanding(&slot_error);

        if let Some(inflight) = &self.inflight {
            inflight.close();
        }
        if let Err(e) = self.writer.shutdown().await {
            tracing::trace!("Transport shutdown: {}", e);
        }

        self.lifecycle.send_modify(|l| l.state = ConnectionState::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::push::{push_channel, PushPolicy};
    use crate::protocol::{Command, DEFAULT_COMPACT_THRESHOLD};
    use tokio::io::{AsyncReadExt, DuplexStream};

    fn driver(
        transport: DuplexStream,
        submissions: mpsc::Receiver<Submission>,
        control: watch::Receiver<Control>,
        lifecycle: Arc<watch::Sender<Lifecycle>>,
    ) -> Driver<DuplexStream> {
        let (push, _) = push_channel(4, PushPolicy::DropNewest);
        Driver::new(
            transport,
            submissions,
            control,
            lifecycle,
            push,
            None,
            None,
            DriverConfig {
                max_unflushed_bytes: 1024 * 1024,
                read_chunk_size: 4096,
                compact_threshold: DEFAULT_COMPACT_THRESHOLD,
                parser: ParserConfig::default(),
            },
        )
    }

    #[tokio::test]
    async fn test_drain_writes_submissions_already_queued() {
        let (client, mut server) = tokio::io::duplex(4096);
        let (submit_tx, submit_rx) = mpsc::channel(8);
        let (control_tx, control_rx) = watch::channel(Control::Run);
        let (lifecycle, _) = watch::channel(Lifecycle::new(ConnectionState::Ready));
        let lifecycle = Arc::new(lifecycle);

        // The send is queued before the drain request, and the loop sees
        // both at once.
        let command = Command::new("GET").arg("k");
        let (slot, reply) = PendingSlot::typed::<String>();
        submit_tx
            .send(Submission {
                wire: command.to_bytes(),
                slots: vec![slot],
            })
            .await
            .unwrap();
        control_tx.send(Control::Drain).unwrap();

        let task = tokio::spawn(driver(client, submit_rx, control_rx, lifecycle.clone()).run());

        let mut written = vec![0u8; command.encoded_len()];
        server.read_exact(&mut written).await.unwrap();
        assert_eq!(&written[..], &command.to_bytes()[..]);
        server.write_all(b"$5\r\nvalue\r\n").await.unwrap();

        assert_eq!(reply.await.unwrap().unwrap(), "value");
        task.await.unwrap();
        assert_eq!(lifecycle.borrow().state, ConnectionState::Closed);
        assert!(lifecycle.borrow().fault.is_none());

        let (late, _late_reply) = PendingSlot::typed::<String>();
        assert!(submit_tx
            .send(Submission {
                wire: command.to_bytes(),
                slots: vec![late],
            })
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_unsolicited_reply_offset_is_its_start() {
        let (client, mut server) = tokio::io::duplex(4096);
        let (submit_tx, submit_rx) = mpsc::channel(8);
        let (_control_tx, control_rx) = watch::channel(Control::Run);
        let (lifecycle, _) = watch::channel(Lifecycle::new(ConnectionState::Ready));
        let lifecycle = Arc::new(lifecycle);

        let (slot, reply) = PendingSlot::typed::<String>();
        submit_tx
            .send(Submission {
                wire: Command::new("PING").to_bytes(),
                slots: vec![slot],
            })
            .await
            .unwrap();

        let task = tokio::spawn(driver(client, submit_rx, control_rx, lifecycle.clone()).run());
        server.write_all(b"+PONG\r\n+OK\r\n").await.unwrap();

        assert_eq!(reply.await.unwrap().unwrap(), "PONG");
        task.await.unwrap();
        match lifecycle.borrow().fault.clone() {
            Some(RespError::Protocol(e)) => {
                assert_eq!(e.kind, ProtocolErrorKind::UnsolicitedReply);
                assert_eq!(e.offset, 7);
            }
            other => panic!("expected protocol fault, got {:?}", other),
        };
    }
}
