use shared::CodecError;
use thiserror::Error;

/// Outcome of processing one inbound message that did not succeed
///
/// None of these escape the per-message dispatch boundary: the handler turns
/// each one into a log line, a disconnect, or nothing at all.
#[derive(Debug, Error)]
pub enum HandleError {
    /// Malformed or truncated message; discarded, connection survives
    #[error("malformed message: {0}")]
    Framing(#[from] CodecError),

    /// Protocol rule violated by the sender
    #[error("{0}")]
    Cheat(String),

    /// Benign early exit, never reported
    #[error("cancelled: {0}")]
    Cancel(String),

    /// Broken invariant on our side
    #[error("internal error: {0}")]
    Internal(String),
}

impl HandleError {
    pub fn cheat(reason: impl Into<String>) -> Self {
        Self::Cheat(reason.into())
    }

    pub fn cancel(reason: impl Into<String>) -> Self {
        Self::Cancel(reason.into())
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }

    pub fn is_cheat(&self) -> bool {
        matches!(self, Self::Cheat(_))
    }
}

pub type HandleResult<T = ()> = Result<T, HandleError>;

/// Failures that stop the server from starting
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid listen address: {0}")]
    InvalidAddress(String),
}
