//! Session token issuance and validation
//!
//! Standard claim shape (`sub`/`iat`/`exp`/`jti`) plus a `role` so the
//! dispatcher never has to look the principal back up to know its
//! permissions.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::AuthError;
use super::principal::{Principal, Role};
use crate::core::constants::DEFAULT_SESSION_TTL_DAYS;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl SessionClaims {
    #[allow(dead_code)]
    pub fn new(principal_id: &str, role: Role) -> Self {
        let now = Utc::now();
        let exp = now + Duration::days(DEFAULT_SESSION_TTL_DAYS as i64);
        Self {
            sub: principal_id.to_string(),
            role,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    pub fn into_principal(self) -> Principal {
        Principal {
            id: self.sub,
            role: self.role,
        }
    }
}

#[allow(dead_code)]
pub fn create_session_token(signing_key: &[u8], principal: &Principal) -> Result<String, AuthError> {
    let claims = SessionClaims::new(&principal.id, principal.role);
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )
    .map_err(|_| AuthError::Unknown)
}

pub fn validate_session_token(token: &str, signing_key: &[u8]) -> Result<SessionClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let token_data = decode::<SessionClaims>(token, &DecodingKey::from_secret(signing_key), &validation)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::ExpiredCredential,
            jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::BadSignature,
            _ => AuthError::Unknown,
        })?;

    Ok(token_data.claims)
}
