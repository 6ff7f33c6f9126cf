//! Bridge error types.

use thiserror::Error;

use crate::status::SessionStatus;

/// Bridge error type.
///
/// Never crosses the host boundary: the C entry points log it and report a
/// status byte or a status broadcast instead.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("session context is not ready (last status: {})", .last_status.map_or("none", SessionStatus::as_str))]
    ContextNotReady { last_status: Option<SessionStatus> },

    #[error("config error: {0}")]
    Config(#[source] anyhow::Error),

    #[error("auth error: {0}")]
    Auth(#[source] anyhow::Error),

    #[error("persist error: {0}")]
    Persist(#[source] anyhow::Error),

    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Bridge result type.
pub type Result<T> = std::result::Result<T, BridgeError>;
