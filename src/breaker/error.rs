//! Circuit Breaker error type

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BreakerError {
    #[error("unknown service '{0}'")]
    UnknownService(String),
    #[error("persistence error: {0}")]
    Storage(#[from] sqlx::Error),
}
