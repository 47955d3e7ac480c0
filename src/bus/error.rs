//! Event bus error type

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("topic channel closed")]
    Closed,
    #[error("receiver lagged by {0} messages")]
    Lagged(u64),
    #[error("topic '{0}' already registered with a different message type")]
    TypeMismatch(String),
}

impl From<tokio::sync::broadcast::error::RecvError> for BusError {
    fn from(err: tokio::sync::broadcast::error::RecvError) -> Self {
        match err {
            tokio::sync::broadcast::error::RecvError::Closed => BusError::Closed,
            tokio::sync::broadcast::error::RecvError::Lagged(n) => BusError::Lagged(n),
        }
    }
}
