//! Out-of-band push delivery.
//!
//! Push values never touch the pending queue. They go to a bounded channel
//! whose overflow behaviour is picked by [`PushPolicy`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::protocol::Value;

/// Default push channel capacity.
pub const DEFAULT_PUSH_CAPACITY: usize = 1024;

/// What happens when the push channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushPolicy {
    /// Drop the incoming push and count it. Replies keep flowing.
    #[default]
    DropNewest,
    /// Wait for the subscriber to make room. While waiting the connection
    /// reads nothing, so replies stall behind a slow subscriber.
    Block,
}

/// Drive-loop side of the push channel.
#[derive(Debug)]
pub(crate) struct PushSender {
    tx: mpsc::Sender<Value>,
    policy: PushPolicy,
    dropped: Arc<AtomicU64>,
}

impl PushSender {
    pub async fn deliver(&self, value: Value) {
        match self.policy {
            PushPolicy::DropNewest => match self.tx.try_send(value) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::warn!("Push channel full, dropped push ({} total)", dropped);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::trace!("No push subscriber, discarding push");
                }
            },
            PushPolicy::Block => {
                if self.tx.send(value).await.is_err() {
                    tracing::trace!("No push subscriber, discarding push");
                }
            }
        }
    }
}

/// Subscriber end for push values.
#[derive(Debug)]
pub struct PushReceiver {
    rx: mpsc::Receiver<Value>,
    dropped: Arc<AtomicU64>,
}

impl PushReceiver {
    /// Next push. `None` once the connection is closed and the queue empty.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Next push if one is queued.
    pub fn try_recv(&mut self) -> Option<Value> {
        self.rx.try_recv().ok()
    }

    /// Pushes dropped so far under [`PushPolicy::DropNewest`].
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub(crate) fn push_channel(capacity: usize, policy: PushPolicy) -> (PushSender, PushReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        PushSender {
            tx,
            policy,
            dropped: dropped.clone(),
        },
        PushReceiver { rx, dropped },
    )
}
