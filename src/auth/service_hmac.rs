//! Service-to-service HMAC credential
//!
//! A timestamp-scoped header rather than a stored API key:
//! `H(secret, timestamp)` compared in constant time, valid for a bounded
//! skew window.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::error::AuthError;
use crate::core::constants::SERVICE_AUTH_SKEW_SECS;
use crate::utils::crypto::constant_time_eq;

type HmacSha256 = Hmac<Sha256>;

fn sign(secret: &[u8], timestamp_ms: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(timestamp_ms.to_string().as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Build the header value a service would send: `<unix_ms>.<hex_hmac>`.
#[allow(dead_code)]
pub fn build_header(secret: &[u8], timestamp_ms: i64) -> String {
    format!("{}.{}", timestamp_ms, sign(secret, timestamp_ms))
}

/// Verify a `X-Service-Auth` header value against the shared secret and the
/// current time, rejecting anything outside `SERVICE_AUTH_SKEW_SECS`.
pub fn verify_header(secret: &[u8], header: &str, now_ms: i64) -> Result<(), AuthError> {
    let (ts_str, mac_hex) = header.split_once('.').ok_or(AuthError::Unknown)?;
    let timestamp_ms: i64 = ts_str.parse().map_err(|_| AuthError::Unknown)?;

    let skew_ms = SERVICE_AUTH_SKEW_SECS * 1000;
    if (now_ms - timestamp_ms).abs() > skew_ms {
        return Err(AuthError::ClockSkew);
    }

    let expected = sign(secret, timestamp_ms);
    if !constant_time_eq(&expected, mac_hex) {
        return Err(AuthError::BadSignature);
    }

    Ok(())
}
