//! Defines the WebSocket message protocol between the daemon and the gateway.

use serde::{Deserialize, Serialize};
use tether_core::connection::ConnectionStatus;

/// Messages sent from the daemon to the gateway.
#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Authenticates the connection. Must be the first frame.
    Identify { token: String },
    /// Requests a join of the given channel.
    Join { channel_id: String },
    /// Leaves a previously joined channel.
    Leave { channel_id: String },
}

/// Messages sent from the gateway to the daemon.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Acknowledges a successful identify and carries the visible topology.
    Ready {
        session_id: String,
        groups: Vec<GroupSnapshot>,
    },
    /// A joined channel's connection moved between states.
    ChannelState {
        channel_id: String,
        old: WireStatus,
        new: WireStatus,
    },
    /// An opaque error on a joined channel.
    ChannelError { channel_id: String, message: String },
    /// The gateway is closing the whole session.
    Closed { code: u16, reason: String },
}

/// A group visible to the authenticated session.
#[derive(Deserialize, Debug, Clone)]
pub struct GroupSnapshot {
    pub id: String,
    pub name: String,
    pub channels: Vec<ChannelSnapshot>,
}

/// A joinable channel within a group.
#[derive(Deserialize, Debug, Clone)]
pub struct ChannelSnapshot {
    pub id: String,
    pub name: String,
}

/// Connection status as spelled on the wire.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WireStatus {
    Connecting,
    Ready,
    Disconnected,
    Destroyed,
}

impl From<WireStatus> for ConnectionStatus {
    fn from(status: WireStatus) -> Self {
        match status {
            WireStatus::Connecting => ConnectionStatus::Connecting,
            WireStatus::Ready => ConnectionStatus::Ready,
            WireStatus::Disconnected => ConnectionStatus::Disconnected,
            WireStatus::Destroyed => ConnectionStatus::Destroyed,
        }
    }
}
