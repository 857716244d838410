//! Account key material persisted at signup and read back at every login.
//!
//! ```text
//! password ─PBKDF2(salt, kdf)─▶ raw ─HKDF─▶ master key (session only)
//!     │                          └─PBKDF2(1 round)─▶ password verifier (server)
//!     └──────────────────────────────────────────────▶ content key (random)
//!                                  wrapped by master key ─▶ wrapped_content_key
//! ```
//!
//! Only `AccountKeys` is stored. The master key and content key live in
//! memory for an unlocked session and are zeroized when dropped.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;
use crate::error::{CryptoError, CryptoResult};
use crate::keys::SymmetricCryptoKey;
use crate::scheme::{KdfConfig, MIN_SALT_LEN};
use crate::service::CryptoService;

/// Persisted per-account key record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountKeys {
    /// KDF parameters fixed at signup
    pub kdf: KdfConfig,
    /// Random per-account salt (base64)
    pub salt: String,
    /// Output of the password verifier derivation (base64)
    pub password_verifier: String,
    /// Content key wrapped under the stretched master key (text envelope)
    pub wrapped_content_key: Envelope,
}

impl AccountKeys {
    /// Create the key material for a new account.
    ///
    /// Returns the record to persist and the live content key.
    pub fn register(
        service: &CryptoService,
        password: &[u8],
        kdf: KdfConfig,
    ) -> CryptoResult<(Self, SymmetricCryptoKey)> {
        let salt = service.generate_salt()?;
        let master = service.derive_stretched_master_key(password, &salt, &kdf)?;
        let verifier = password_verifier(service, password, &salt, &kdf)?;

        let content_key = service.create_key(kdf.encryption())?;
        let wrapped = service.encrypt(content_key.as_bytes(), &master)?;

        tracing::info!(
            kdf = %kdf.kdf(),
            scheme = %kdf.encryption(),
            iterations = kdf.iterations(),
            "registered account keys"
        );

        let record = Self {
            kdf,
            salt: STANDARD.encode(&salt),
            password_verifier: STANDARD.encode(verifier),
            wrapped_content_key: wrapped,
        };
        Ok((record, content_key))
    }

    /// Re-derive the master key and unwrap the content key.
    ///
    /// A wrong password surfaces as the same decryption errors as any other
    /// failed unwrap.
    pub fn unlock(
        &self,
        service: &CryptoService,
        password: &[u8],
    ) -> CryptoResult<SymmetricCryptoKey> {
        let kdf = &self.kdf;
        let salt = self.salt_bytes()?;
        let master = service.derive_stretched_master_key(password, &salt, kdf)?;
        let raw = service.decrypt(&self.wrapped_content_key, &master)?;
        SymmetricCryptoKey::from_slice(&raw, kdf.encryption())
    }

    /// Recompute the verifier for `password`, base64-encoded, for sending to
    /// the verification boundary. Comparison happens there, not here.
    pub fn verifier_for(&self, service: &CryptoService, password: &[u8]) -> CryptoResult<String> {
        let salt = self.salt_bytes()?;
        let verifier = password_verifier(service, password, &salt, &self.kdf)?;
        Ok(STANDARD.encode(verifier))
    }

    pub fn salt_bytes(&self) -> CryptoResult<Vec<u8>> {
        let salt = STANDARD
            .decode(&self.salt)
            .map_err(|e| record_error("account salt is not valid base64", e))?;
        if salt.len() < MIN_SALT_LEN {
            return Err(CryptoError::config(format!(
                "account salt must be at least {MIN_SALT_LEN} bytes, got {}",
                salt.len()
            )));
        }
        Ok(salt)
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> CryptoResult<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| record_error("account serialization", e))
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(data: &[u8]) -> CryptoResult<Self> {
        serde_json::from_slice(data)
            .map_err(|e| record_error("account deserialization", e))
    }
}

fn password_verifier(
    service: &CryptoService,
    password: &[u8],
    salt: &[u8],
    config: &KdfConfig,
) -> CryptoResult<Vec<u8>> {
    let (n, kdf) = (config.iterations(), config.kdf());
    service.derive_password_verifier(password, salt, n, kdf)
}

fn record_error(context: &str, e: impl std::fmt::Display) -> CryptoError {
    CryptoError::format(format!("{context}: {e}"))
}
