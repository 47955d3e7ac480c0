//! Auth Verifier (C2)
//!
//! Validates bearer credentials: a signed session token (cookie, header, or
//! query parameter) or a short-lived service HMAC header. No I/O beyond the
//! shared secrets read once at startup.

mod error;
mod jwt;
mod principal;
mod service_hmac;

pub use error::AuthError;
pub use principal::{Principal, Role};

use crate::core::constants::SERVICE_AUTH_HEADER;
use crate::core::secret::SecretManager;

/// The raw credential a caller presents, already extracted from the
/// transport (cookie / header / query parameter preference order is the
/// Hub Entry Point's job, not this verifier's).
#[derive(Debug, Clone)]
pub enum Credential {
    SessionToken(String),
    ServiceHeader(String),
}

pub struct AuthVerifier {
    jwt_signing_key: Vec<u8>,
    service_hmac_secret: Vec<u8>,
    enabled: bool,
}

impl AuthVerifier {
    pub fn new(secrets: &SecretManager, enabled: bool) -> Self {
        Self {
            jwt_signing_key: secrets.jwt_signing_key().to_vec(),
            service_hmac_secret: secrets.service_hmac_secret().to_vec(),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn service_auth_header_name() -> &'static str {
        SERVICE_AUTH_HEADER
    }

    #[allow(dead_code)]
    pub fn issue_session_token(&self, principal: &Principal) -> Result<String, AuthError> {
        jwt::create_session_token(&self.jwt_signing_key, principal)
    }

    /// `verify(credential) → Principal | Unauthenticated`. A missing
    /// credential is not an error: it resolves to the guest principal (or,
    /// with auth disabled operationally, a principal with full access).
    pub fn verify(&self, credential: Option<Credential>) -> Result<Principal, AuthError> {
        if !self.enabled {
            return Ok(Principal {
                id: "local".to_string(),
                role: Role::Superadmin,
            });
        }

        match credential {
            None => Ok(Principal::guest()),
            Some(Credential::SessionToken(token)) => {
                jwt::validate_session_token(&token, &self.jwt_signing_key)
                    .map(jwt::SessionClaims::into_principal)
            }
            Some(Credential::ServiceHeader(header)) => {
                let now_ms = chrono::Utc::now().timestamp_millis();
                service_hmac::verify_header(&self.service_hmac_secret, &header, now_ms)?;
                Ok(Principal {
                    id: "service".to_string(),
                    role: Role::Superadmin,
                })
            }
        }
    }
}
