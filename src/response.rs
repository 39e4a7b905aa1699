//! Fixed-arity response bundles for batched sends.
//!
//! A bundle is a tuple of per-command results in submission order:
//!
//! ```ignore
//! let (set, get): (Result<Status>, Result<String>) = conn
//!     .send_batch(
//!         Batch::new()
//!             .command(Command::new("SET").arg("k").arg("v"))
//!             .command(Command::new("GET").arg("k")),
//!     )
//!     .await?;
//! ```
//!
//! Each element succeeds or fails on its own: a type mismatch or server
//! error in one position leaves the others untouched.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::oneshot;

use crate::adapter::FromResp;
use crate::error::{AbortReason, RespError, Result};
use crate::pipeline::PendingSlot;

/// Type alias for a boxed future that is Send.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A tuple of results, one per command of a batch.
pub trait ResponseBundle: Sized + Send + 'static {
    /// Receivers matching the slots, in the same order.
    type Receivers: Send + 'static;

    /// Number of commands the bundle expects.
    const ARITY: usize;

    /// One pending slot per element, plus the receivers for their replies.
    fn slots() -> (Vec<PendingSlot>, Self::Receivers);

    /// Wait for every element and assemble the bundle.
    fn collect(receivers: Self::Receivers) -> BoxFuture<'static, Self>;
}

/// Flatten a receive into a result. A dropped sender means the slot was torn
/// down without a reply.
pub(crate) fn settle<T>(
    received: std::result::Result<Result<T>, oneshot::error::RecvError>,
) -> Result<T> {
    received.unwrap_or_else(|_| Err(RespError::aborted(AbortReason::Closed)))
}

macro_rules! impl_response_bundle {
    ($arity:expr; $($T:ident $rx:ident),+) => {
        impl<$($T: FromResp),+> ResponseBundle for ($(Result<$T>,)+) {
            type Receivers = ($(oneshot::Receiver<Result<$T>>,)+);

            const ARITY: usize = $arity;

            fn slots() -> (Vec<PendingSlot>, Self::Receivers) {
                let mut slots = Vec::with_capacity($arity);
                $(
                    let (slot, $rx) = PendingSlot::typed::<$T>();
                    slots.push(slot);
                )+
                (slots, ($($rx,)+))
            }

            fn collect(receivers: Self::Receivers) -> BoxFuture<'static, Self> {
                let ($($rx,)+) = receivers;
                Box::pin(async move { ($(settle($rx.await),)+) })
            }
        }
    };
}

impl_response_bundle!(1; A a);
impl_response_bundle!(2; A a, B b);
impl_response_bundle!(3; A a, B b, C c);
impl_response_bundle!(4; A a, B b, C c, D d);
impl_response_bundle!(5; A a, B b, C c, D d, E e);
impl_response_bundle!(6; A a, B b, C c, D d, E e, F f);
impl_response_bundle!(7; A a, B b, C c, D d, E e, F f, G g);
impl_response_bundle!(8; A a, B b, C c, D d, E e, F f, G g, H h);
