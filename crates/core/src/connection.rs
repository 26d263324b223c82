//! Status model and events for a single channel connection.

use std::fmt;

/// Status of the live channel connection, as reported by the session client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// A join has been issued and the handshake is in flight.
    Connecting,
    /// The channel session is established.
    Ready,
    /// The session dropped; the handle is no longer usable.
    Disconnected,
    /// The handle was torn down. Terminal for that handle instance.
    Destroyed,
}

/// An asynchronous event emitted by a live connection handle.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// The connection moved from one status to another.
    StatusChange {
        old: ConnectionStatus,
        new: ConnectionStatus,
    },
    /// An opaque connection-level failure. The handle's own lifecycle
    /// event follows separately.
    Error(String),
}

/// A resolved group, as returned by [`crate::client::Session::lookup_group`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRef {
    pub id: String,
    pub name: String,
}

/// A resolved channel within a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    pub id: String,
    pub name: String,
}

/// Why a connection attempt or an established connection failed.
///
/// These are reasons, not error types: every variant is routed into the
/// same bounded-retry path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The configured group id did not resolve.
    GroupNotFound,
    /// The configured channel id did not resolve within its group.
    ChannelNotFound,
    /// The live connection reported `Disconnected`.
    Disconnected,
    /// The session-level transport closed underneath us.
    GatewayDisconnect,
    /// An opaque join or connection error.
    Connection(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::GroupNotFound => write!(f, "group not found"),
            FailureReason::ChannelNotFound => write!(f, "channel not found"),
            FailureReason::Disconnected => write!(f, "connection disconnected"),
            FailureReason::GatewayDisconnect => write!(f, "gateway disconnected"),
            FailureReason::Connection(msg) => write!(f, "connection error: {}", msg),
        }
    }
}
