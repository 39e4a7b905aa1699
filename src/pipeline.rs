//! Pending reply slots and the FIFO that correlates them with replies.
//!
//! RESP carries no request identifiers: replies arrive in the order the
//! commands were written. The connection therefore enqueues one
//! [`PendingSlot`] per command, in the same step that appends the command
//! to the outgoing buffer, and completes the oldest slot with every
//! non-push value the parser produces.
//!
//! Each slot is completed exactly once. A slot dropped without completion
//! (for example when the queue is torn down) completes itself with
//! [`AbortReason::Closed`].

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use tokio::sync::{oneshot, OwnedSemaphorePermit};

use crate::adapter::{adapt, FromResp};
use crate::error::{AbortReason, RespError, Result};
use crate::protocol::Value;

type Completion = Box<dyn FnOnce(Result<Value>) + Send>;

/// One outstanding request awaiting its reply.
pub struct PendingSlot {
    id: u64,
    issued_at: Instant,
    /// Name of the type the caller asked for.
    target: &'static str,
    complete: Option<Completion>,
    /// In-flight permit held until the reply arrives.
    permit: Option<OwnedSemaphorePermit>,
}

impl PendingSlot {
    /// Create a slot that adapts its reply into `T`.
    ///
    /// The receiver yields the adapted result. If the receiver has been
    /// dropped by the time the reply arrives, the reply is discarded.
    pub fn typed<T: FromResp>() -> (Self, oneshot::Receiver<Result<T>>) {
        let (tx, rx) = oneshot::channel();
        let complete: Completion = Box::new(move |reply: Result<Value>| {
            if tx.is_closed() {
                return;
            }
            let _ = tx.send(reply.and_then(adapt::<T>));
        });
        let slot = Self {
            id: 0,
            issued_at: Instant::now(),
            target: std::any::type_name::<T>(),
            complete: Some(complete),
            permit: None,
        };
        (slot, rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn target(&self) -> &'static str {
        self.target
    }

    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }

    pub(crate) fn attach_permit(&mut self, permit: OwnedSemaphorePermit) {
        self.permit = Some(permit);
    }

    /// Complete with a reply from the server.
    pub fn fulfill(mut self, value: Value) {
        self.finish(Ok(value));
    }

    /// Complete with an error.
    pub fn fail(mut self, err: RespError) {
        self.finish(Err(err));
    }

    fn finish(&mut self, reply: Result<Value>) {
        if let Some(complete) = self.complete.take() {
            complete(reply);
        }
    }
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.finish(Err(RespError::aborted(AbortReason::Closed)));
    }
}

impl fmt::Debug for PendingSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingSlot")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("completed", &self.complete.is_none())
            .finish()
    }
}

/// FIFO of pending slots, owned by the connection's drive loop.
#[derive(Debug, Default)]
pub struct Pipeline {
    queue: VecDeque<PendingSlot>,
    next_id: u64,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a slot, returning the id it was given.
    pub fn push_back(&mut self, mut slot: PendingSlot) -> u64 {
        self.next_id += 1;
        slot.id = self.next_id;
        self.queue.push_back(slot);
        self.next_id
    }

    /// Enqueue several slots in order.
    pub fn extend(&mut self, slots: impl IntoIterator<Item = PendingSlot>) {
        for slot in slots {
            self.push_back(slot);
        }
    }

    /// Complete the oldest slot with `value`.
    ///
    /// Returns the slot id, or hands the value back if nothing is pending.
    pub fn fulfill_next(&mut self, value: Value) -> std::result::Result<u64, Value> {
        match self.queue.pop_front() {
            Some(slot) => {
                let id = slot.id;
                slot.fulfill(value);
                Ok(id)
            }
            None => Err(value),
        }
    }

    /// Complete every pending slot with an error. Returns how many there were.
    pub fn fail_all(&mut self, err: &RespError) -> usize {
        let count = self.queue.len();
        for slot in self.queue.drain(..) {
            slot.fail(err.clone());
        }
        count
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Time the oldest pending request has been waiting.
    pub fn oldest_wait(&self) -> Option<std::time::Duration> {
        self.queue.front().map(|slot| slot.issued_at.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterErrorKind;

    #[tokio::test]
    async fn test_fulfill_in_order() {
        let mut pipeline = Pipeline::new();
        let (a, rx_a) = PendingSlot::typed::<i64>();
        let (b, rx_b) = PendingSlot::typed::<String>();
        assert_eq!(pipeline.push_back(a), 1);
        assert_eq!(pipeline.push_back(b), 2);

        assert_eq!(pipeline.fulfill_next(Value::Integer(7)), Ok(1));
        assert_eq!(pipeline.fulfill_next(Value::from("x")), Ok(2));
        assert!(pipeline.is_empty());

        assert_eq!(rx_a.await.unwrap().unwrap(), 7);
        assert_eq!(rx_b.await.unwrap().unwrap(), "x");
    }

    #[tokio::test]
    async fn test_empty_pipeline_returns_value() {
        let mut pipeline = Pipeline::new();
        assert_eq!(
            pipeline.fulfill_next(Value::Integer(1)),
            Err(Value::Integer(1))
        );
    }

    #[tokio::test]
    async fn test_adapter_error_stays_local() {
        let mut pipeline = Pipeline::new();
        let (a, rx_a) = PendingSlot::typed::<i64>();
        let (b, rx_b) = PendingSlot::typed::<i64>();
        pipeline.extend([a, b]);

        pipeline.fulfill_next(Value::from("nope")).unwrap();
        pipeline.fulfill_next(Value::Integer(2)).unwrap();

        match rx_a.await.unwrap() {
            Err(RespError::TypeMismatch(e)) => {
                assert_eq!(e.kind(), AdapterErrorKind::TypeMismatch)
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(rx_b.await.unwrap().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_fail_all_completes_each_once() {
        let mut pipeline = Pipeline::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (slot, rx) = PendingSlot::typed::<Value>();
            pipeline.push_back(slot);
            receivers.push(rx);
        }

        let err = RespError::aborted(AbortReason::Faulted);
        assert_eq!(pipeline.fail_all(&err), 3);
        for rx in receivers {
            assert!(matches!(
                rx.await.unwrap(),
                Err(RespError::OperationAborted(AbortReason::Faulted))
            ));
        }
    }

    #[tokio::test]
    async fn test_dropped_slot_aborts() {
        let (slot, rx) = PendingSlot::typed::<String>();
        drop(slot);
        assert!(matches!(
            rx.await.unwrap(),
            Err(RespError::OperationAborted(AbortReason::Closed))
        ));
    }

    #[tokio::test]
    async fn test_abandoned_receiver_discards_reply() {
        let mut pipeline = Pipeline::new();
        let (slot, rx) = PendingSlot::typed::<String>();
        pipeline.push_back(slot);
        drop(rx);
        assert_eq!(pipeline.fulfill_next(Value::from("late")), Ok(1));
        assert!(pipeline.is_empty());
    }
}
