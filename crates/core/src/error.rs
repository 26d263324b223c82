use thiserror::Error;

/// Failures surfaced by a session client implementation.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("login failed: {0}")]
    Login(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("gateway error: {0}")]
    Gateway(String),
    #[error("join failed: {0}")]
    Join(String),
}
