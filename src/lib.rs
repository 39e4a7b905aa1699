//! # resp3-client
//!
//! Client-side engine for RESP3, the typed wire protocol spoken by Redis and
//! compatible servers.
//!
//! This crate lets many tasks share one server connection: commands are
//! pipelined over a single byte stream and every reply is matched back to
//! the caller that asked for it, strictly in order.
//!
//! ## Architecture
//!
//! - **Protocol**: value model, resumable parser, command encoding
//! - **Adapter**: typed conversion of replies (`FromResp`)
//! - **Connection**: one drive loop task owning the transport, a FIFO of
//!   pending replies, and a side channel for server pushes; optional
//!   reconnection with backoff after a fault
//!
//! ## Example
//!
//! ```ignore
//! use resp3_client::{Batch, Command, ConnectionBuilder, Result, Status};
//!
//! #[tokio::main]
//! async fn main() -> resp3_client::Result<()> {
//!     let (conn, mut pushes) = ConnectionBuilder::new()
//!         .setup(Command::new("HELLO").arg(3))
//!         .connect_tcp("127.0.0.1:6379")
//!         .await?;
//!
//!     let (set, get): (Result<Status>, Result<String>) = conn
//!         .send_batch(
//!             Batch::new()
//!                 .command(Command::new("SET").arg("k").arg("v"))
//!                 .command(Command::new("GET").arg("k")),
//!         )
//!         .await?;
//!
//!     conn.close().await;
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod connection;
pub mod error;
pub mod pipeline;
pub mod protocol;
pub mod response;
pub mod transport;

pub use adapter::{adapt, AdapterError, Attributed, FromResp, KeyValues, Status};
pub use connection::{
    Connection, ConnectionBuilder, ConnectionConfig, ConnectionState, PushPolicy, PushReceiver,
    ReconnectPolicy,
};
pub use error::{AbortReason, ProtocolError, ProtocolErrorKind, RespError, Result, ServerError};
pub use protocol::{Batch, Command, Kind, Value};
pub use response::ResponseBundle;
