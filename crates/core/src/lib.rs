//! Tether Core Library
//!
//! Domain types for keeping a process tethered to one remote realtime
//! channel: the connection status model, the session-client trait seam the
//! daemon drives, and the pure reconnection policy. No I/O lives here; the
//! concrete gateway client and the supervisor loop live in `tether-daemon`.

pub mod client;
pub mod connection;
pub mod error;
pub mod policy;
