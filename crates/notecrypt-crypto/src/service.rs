//! `CryptoService`: the only entry point collaborators use.
//!
//! Holds nothing but a shared handle to a stateless backend, so one instance
//! can be cloned freely and used from many threads at once.

use std::sync::Arc;

use zeroize::Zeroizing;

use crate::backend::CryptoBackend;
use crate::cipher::{aes_cbc_decrypt, aes_cbc_encrypt, generate_mac, verify_mac};
use crate::envelope::Envelope;
use crate::error::{CryptoError, CryptoResult};
use crate::keys::SymmetricCryptoKey;
use crate::scheme::{EncryptionScheme, KdfConfig, KdfScheme, MIN_SALT_LEN};
use crate::{kdf, stretch, IV_SIZE};

#[derive(Debug, Clone)]
pub struct CryptoService {
    backend: Arc<dyn CryptoBackend>,
}

impl CryptoService {
    pub fn new(backend: Arc<dyn CryptoBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &dyn CryptoBackend {
        self.backend.as_ref()
    }

    // ── Key setup ────────────────────────────────────────────────────────────

    /// Raw PBKDF2 output for `kdf`. See [`kdf::derive_key`].
    pub fn derive_key(
        &self,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
        kdf: KdfScheme,
    ) -> CryptoResult<Zeroizing<Vec<u8>>> {
        kdf::derive_key(self.backend(), password, salt, iterations, kdf)
    }

    /// One-way verifier for the server-side verification boundary.
    pub fn derive_password_verifier(
        &self,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
        kdf: KdfScheme,
    ) -> CryptoResult<Vec<u8>> {
        kdf::derive_password_verifier(self.backend(), password, salt, iterations, kdf)
    }

    pub fn stretch_key(
        &self,
        raw: &[u8],
        scheme: EncryptionScheme,
    ) -> CryptoResult<Zeroizing<Vec<u8>>> {
        stretch::stretch_key(self.backend(), raw, scheme)
    }

    /// Derive the session key that wraps an account's content key.
    ///
    /// Runs one PBKDF2 pass at the configured iteration count. Async hosts
    /// should call it from a blocking worker.
    pub fn derive_stretched_master_key(
        &self,
        password: &[u8],
        salt: &[u8],
        config: &KdfConfig,
    ) -> CryptoResult<SymmetricCryptoKey> {
        if password.is_empty() {
            return Err(CryptoError::config("password must not be empty"));
        }
        if salt.is_empty() {
            return Err(CryptoError::config("salt must not be empty"));
        }
        let (iterations, scheme) = (config.iterations(), config.encryption());
        let raw = self.derive_key(password, salt, iterations, config.kdf())?;
        let stretched = self.stretch_key(&raw, scheme)?;
        SymmetricCryptoKey::from_slice(&stretched, scheme)
    }

    /// Fresh random key of the scheme's total length.
    pub fn create_key(&self, scheme: EncryptionScheme) -> CryptoResult<SymmetricCryptoKey> {
        let bytes = self.backend.random_bytes(scheme.total_key_len())?;
        SymmetricCryptoKey::from_bytes(bytes, scheme)
    }

    pub fn random_bytes(&self, len: usize) -> CryptoResult<Vec<u8>> {
        self.backend.random_bytes(len)
    }

    /// Random per-account salt of [`MIN_SALT_LEN`] bytes.
    pub fn generate_salt(&self) -> CryptoResult<Vec<u8>> {
        self.backend.random_bytes(MIN_SALT_LEN)
    }

    // ── Encrypt / decrypt ────────────────────────────────────────────────────

    /// Encrypt under a fresh IV, MACing `iv || ciphertext` when the scheme
    /// has a MAC.
    pub fn encrypt(&self, plaintext: &[u8], key: &SymmetricCryptoKey) -> CryptoResult<Envelope> {
        let scheme = key.scheme();

        let iv_bytes = self.backend.random_bytes(IV_SIZE)?;
        let iv: [u8; IV_SIZE] = iv_bytes
            .try_into()
            .map_err(|_| CryptoError::backend("CSPRNG returned a short IV"))?;

        let ciphertext = aes_cbc_encrypt(self.backend(), plaintext, &iv, key.enc_key())?;
        let mac = self.mac_for(&iv, &ciphertext, key)?;

        tracing::trace!(scheme = %scheme, len = plaintext.len(), "encrypted payload");
        Envelope::new(scheme, iv, ciphertext, mac)
    }

    fn mac_for(
        &self,
        iv: &[u8],
        ciphertext: &[u8],
        key: &SymmetricCryptoKey,
    ) -> CryptoResult<Option<Vec<u8>>> {
        let scheme = key.scheme();
        match (scheme.mac_algorithm(), key.mac_key()) {
            (Some(hash), Some(mac_key)) => {
                let mac = generate_mac(self.backend(), iv, ciphertext, mac_key, hash)?;
                Ok(Some(mac))
            }
            (None, _) => Ok(None),
            (Some(_), None) => Err(CryptoError::config(format!("{scheme} key has no MAC key"))),
        }
    }

    /// [`encrypt`](Self::encrypt) straight to the text form.
    pub fn encrypt_to_string(
        &self,
        plaintext: &[u8],
        key: &SymmetricCryptoKey,
    ) -> CryptoResult<String> {
        self.encrypt(plaintext, key).map(|env| env.to_text())
    }

    /// [`encrypt`](Self::encrypt) straight to the binary form.
    pub fn encrypt_to_binary(
        &self,
        plaintext: &[u8],
        key: &SymmetricCryptoKey,
    ) -> CryptoResult<Vec<u8>> {
        self.encrypt(plaintext, key).map(|env| env.to_bytes())
    }

    /// Verify then decrypt.
    ///
    /// Order: scheme equality, then MAC (constant time), then the cipher. The
    /// cipher is never run on unauthenticated input for MAC schemes, and any
    /// cipher failure is reported without padding detail.
    pub fn decrypt(
        &self,
        envelope: &Envelope,
        key: &SymmetricCryptoKey,
    ) -> CryptoResult<Zeroizing<Vec<u8>>> {
        if envelope.scheme() != key.scheme() {
            tracing::debug!(
                envelope = %envelope.scheme(),
                key = %key.scheme(),
                "decrypt: scheme mismatch"
            );
            return Err(CryptoError::Mismatch {
                envelope: envelope.scheme(),
                key: key.scheme(),
            });
        }

        match (key.scheme().mac_algorithm(), key.mac_key(), envelope.mac()) {
            (None, _, _) => {}
            (Some(hash), Some(mac_key), Some(mac)) => {
                let valid = verify_mac(
                    self.backend(),
                    envelope.iv(),
                    envelope.ciphertext(),
                    mac,
                    mac_key,
                    hash,
                )?;
                if !valid {
                    tracing::debug!(scheme = %key.scheme(), "decrypt: MAC verification failed");
                    return Err(CryptoError::Integrity);
                }
            }
            (Some(_), _, _) => return Err(CryptoError::Integrity),
        }

        let (ciphertext, iv) = (envelope.ciphertext(), envelope.iv());
        aes_cbc_decrypt(self.backend(), ciphertext, iv, key.enc_key())
            .map_err(|_| CryptoError::backend("decryption failed"))
    }

    /// Decrypt a text-form envelope.
    pub fn decrypt_str(
        &self,
        text: &str,
        key: &SymmetricCryptoKey,
    ) -> CryptoResult<Zeroizing<Vec<u8>>> {
        self.decrypt(&Envelope::parse_text(text)?, key)
    }

    /// Decrypt a binary-form envelope.
    pub fn decrypt_bytes(
        &self,
        bytes: &[u8],
        key: &SymmetricCryptoKey,
    ) -> CryptoResult<Zeroizing<Vec<u8>>> {
        self.decrypt(&Envelope::from_bytes(bytes)?, key)
    }
}
