use crate::coordination::CoordinationError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue is empty")]
    NoSuchElement,
    #[error("connection to coordination service lost")]
    ConnectionLoss,
    #[error("coordination session expired")]
    SessionExpired,
    #[error("invalid queue directory '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("coordination error: {0}")]
    Coordination(CoordinationError),
}

impl From<CoordinationError> for QueueError {
    fn from(error: CoordinationError) -> Self {
        match error {
            CoordinationError::ConnectionLoss => QueueError::ConnectionLoss,
            CoordinationError::SessionExpired => QueueError::SessionExpired,
            CoordinationError::InvalidPath { path, reason } => {
                QueueError::InvalidPath { path, reason }
            }
            other => QueueError::Coordination(other),
        }
    }
}

impl QueueError {
    /// True when the session is unusable and the operation must be re-issued
    /// on a fresh connection
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, QueueError::ConnectionLoss | QueueError::SessionExpired)
    }
}
