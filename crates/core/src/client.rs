//! The session-client seam between the supervisor and the remote platform.
//!
//! The daemon only ever talks to these traits; the concrete WebSocket
//! gateway client (and the test fakes) implement them.

use crate::connection::{ChannelRef, ConnectionEvent, GroupRef};
use crate::error::ClientError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Entry point to the remote platform: authenticates and yields a session.
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Authenticate with the given credential token.
    ///
    /// Login failures are transient by assumption; the caller retries
    /// indefinitely at a fixed interval.
    async fn login(&self, token: &str) -> Result<Arc<dyn Session>, ClientError>;
}

/// An authenticated session. Lookups are synchronous against local state;
/// absence is a named condition, not an error.
#[async_trait]
pub trait Session: Send + Sync {
    fn lookup_group(&self, group_id: &str) -> Option<GroupRef>;

    fn lookup_channel(&self, group: &GroupRef, channel_id: &str) -> Option<ChannelRef>;

    /// Issue a join for the channel. Returns immediately with the live
    /// handle; readiness arrives later as a status-change event.
    async fn join(&self, channel: &ChannelRef) -> Result<JoinedChannel, ClientError>;

    /// Whether the underlying session transport is still up.
    fn is_alive(&self) -> bool;

    /// Tear the session down. Safe to call more than once.
    async fn destroy(&self);
}

/// A live handle to a joined channel plus its event stream.
pub struct JoinedChannel {
    pub handle: Box<dyn Connection>,
    pub events: mpsc::Receiver<ConnectionEvent>,
}

/// The owned handle to one channel connection.
pub trait Connection: Send + Sync {
    /// Tear the connection down. Must be idempotent and must never fail
    /// observably; implementations swallow any internal error.
    fn destroy(&self);
}
