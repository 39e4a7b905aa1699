//! Connection lifecycle states.

use std::fmt;

use crate::error::RespError;

/// Where a connection is in its lifecycle.
///
/// ```text
/// disconnected -> connecting -> ready -> draining -> closed
///                                  \ -> faulted  -> closed
///                                          \ -> reconnecting -> ready
/// ```
///
/// Only `Ready` accepts new requests. A faulted connection only moves to
/// `reconnecting` when a [`ReconnectPolicy`](super::ReconnectPolicy) is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    /// Transport attached, setup commands running.
    Connecting,
    Ready,
    /// No new requests; replies to in-flight ones are still delivered.
    Draining,
    /// A fatal error occurred; pending requests are being failed.
    Faulted,
    /// Opening a new transport and replaying setup after a fault.
    Reconnecting,
    Closed,
}

impl ConnectionState {
    pub fn name(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Draining => "draining",
            ConnectionState::Faulted => "faulted",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        }
    }

    #[inline]
    pub fn is_ready(self) -> bool {
        self == ConnectionState::Ready
    }

    /// `Faulted` or `Closed`: nothing in flight will be delivered. A
    /// reconnecting connection can still leave `Faulted`.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Faulted | ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State plus the fatal error that ended the connection, if any. Published
/// by the drive loop on a watch channel.
#[derive(Debug, Clone)]
pub(crate) struct Lifecycle {
    pub state: ConnectionState,
    pub fault: Option<RespError>,
}

impl Lifecycle {
    pub fn new(state: ConnectionState) -> Self {
        Self { state, fault: None }
    }
}

/// Requests from handles to the drive loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    Run,
    /// Stop accepting, deliver what is in flight, then close.
    Drain,
    /// Close now, aborting whatever is in flight.
    Close,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(ConnectionState::Ready.is_ready());
        assert!(!ConnectionState::Draining.is_ready());
        assert!(ConnectionState::Faulted.is_terminal());
        assert!(ConnectionState::Closed.is_terminal());
        assert!(!ConnectionState::Connecting.is_terminal());
        assert!(!ConnectionState::Reconnecting.is_ready());
        assert!(!ConnectionState::Reconnecting.is_terminal());
        assert_eq!(ConnectionState::Draining.to_string(), "draining");
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
    }
}
