//! WebSocket-backed session client for the tether gateway.

pub mod client;
pub mod protocol;

pub use client::GatewayClient;
