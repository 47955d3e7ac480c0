//! Local secret material
//!
//! The hub needs two pieces of secret key material: a JWT signing key for
//! session tokens and an HMAC secret for service-to-service credentials.
//! Both are generated once and persisted to the data directory on first
//! boot rather than requiring an operator to supply them.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::fs;

use super::storage::AppStorage;
use crate::utils::crypto;

const JWT_KEY_FILE: &str = "jwt_signing.key";
const SERVICE_HMAC_FILE: &str = "service_hmac.key";

#[derive(Debug, Clone)]
pub struct SecretManager {
    jwt_signing_key: Vec<u8>,
    service_hmac_secret: Vec<u8>,
}

impl SecretManager {
    pub async fn init(storage: &AppStorage) -> Result<Self> {
        let jwt_signing_key = Self::load_or_create(storage.data_dir().join(JWT_KEY_FILE)).await?;
        let service_hmac_secret =
            Self::load_or_create(storage.data_dir().join(SERVICE_HMAC_FILE)).await?;

        Ok(Self {
            jwt_signing_key,
            service_hmac_secret,
        })
    }

    async fn load_or_create(path: PathBuf) -> Result<Vec<u8>> {
        match fs::read_to_string(&path).await {
            Ok(hex_str) => {
                crypto::decode_hex(hex_str.trim()).context("Corrupt secret file")
            }
            Err(_) => {
                let key = crypto::generate_signing_key();
                fs::write(&path, crypto::encode_hex(&key)).await?;
                Ok(key)
            }
        }
    }

    pub fn jwt_signing_key(&self) -> &[u8] {
        &self.jwt_signing_key
    }

    pub fn service_hmac_secret(&self) -> &[u8] {
        &self.service_hmac_secret
    }
}
