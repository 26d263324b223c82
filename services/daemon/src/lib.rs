//! Tether Daemon Library Crate
//!
//! This library contains all the logic for the tether daemon: configuration,
//! the supervisor that owns the channel connection and its reconnection
//! state machine, the WebSocket gateway client, and the liveness router.
//! The `tetherd` binary is a thin wrapper around this library.

pub mod config;
pub mod gateway;
pub mod router;
pub mod supervisor;
