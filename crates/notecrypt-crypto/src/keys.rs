//! Symmetric key model: raw key bytes bound to an encryption scheme.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::scheme::EncryptionScheme;

/// A symmetric key sized for exactly one [`EncryptionScheme`].
///
/// The raw bytes are `enc_key || mac_key`. Subkeys are borrowed views into
/// the raw buffer; the type never hands out mutable access, so the views
/// cannot be changed behind the parent's back. Zeroized on drop.
#[derive(Clone)]
pub struct SymmetricCryptoKey {
    bytes: Vec<u8>,
    scheme: EncryptionScheme,
}

impl SymmetricCryptoKey {
    /// Take ownership of `bytes`. Fails unless the length equals the
    /// scheme's total key length.
    pub fn from_bytes(bytes: Vec<u8>, scheme: EncryptionScheme) -> CryptoResult<Self> {
        let expected = scheme.total_key_len();
        if bytes.len() != expected {
            let got = bytes.len();
            let mut bytes = bytes;
            bytes.zeroize();
            return Err(CryptoError::config(format!(
                "{scheme} expects a {expected}-byte key, got {got}"
            )));
        }
        Ok(Self { bytes, scheme })
    }

    pub fn from_slice(bytes: &[u8], scheme: EncryptionScheme) -> CryptoResult<Self> {
        Self::from_bytes(bytes.to_vec(), scheme)
    }

    /// Rebuild a key previously exported with [`to_base64`](Self::to_base64).
    pub fn from_base64(b64: &str, scheme: EncryptionScheme) -> CryptoResult<Self> {
        let bytes = STANDARD
            .decode(b64.trim())
            .map_err(|e| CryptoError::format(format!("key is not valid base64: {e}")))?;
        Self::from_bytes(bytes, scheme)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    pub fn scheme(&self) -> EncryptionScheme {
        self.scheme
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn enc_key(&self) -> &[u8] {
        &self.bytes[..self.scheme.enc_key_len()]
    }

    /// `None` for schemes without a MAC.
    pub fn mac_key(&self) -> Option<&[u8]> {
        self.scheme
            .mac_algorithm()
            .map(|_| &self.bytes[self.scheme.enc_key_len()..])
    }
}

impl Drop for SymmetricCryptoKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SymmetricCryptoKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricCryptoKey")
            .field("scheme", &self.scheme)
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
