//! Auth Verifier error taxonomy

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("credential has expired")]
    ExpiredCredential,
    #[error("bad signature")]
    BadSignature,
    #[error("clock skew outside tolerance")]
    ClockSkew,
    #[error("unknown credential")]
    Unknown,
}
