use std::time::Duration;

use thiserror::Error;

use crate::rpc::message::ResponseError;
use crate::rpc::session::SessionState;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Malformed wire data; the connection is terminated.
    #[error("Protocol framing error: {0}")]
    ProtocolFraming(String),

    #[error("Cannot send {method} while the session is {state}")]
    InvalidState { method: String, state: SessionState },

    #[error("No response to {method} within {after:?}")]
    Timeout { method: String, after: Duration },

    #[error("Session closed")]
    SessionClosed,

    #[error("Server returned error {}: {}", .0.code, .0.message)]
    Remote(ResponseError),

    #[error("Transport I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl SessionError {
    pub(crate) fn framing(reason: impl Into<String>) -> Self {
        SessionError::ProtocolFraming(reason.into())
    }
}

impl From<ResponseError> for SessionError {
    fn from(error: ResponseError) -> Self {
        SessionError::Remote(error)
    }
}
