//! Primitive backends: CSPRNG, PBKDF2, HMAC, HKDF and AES-CBC.
//!
//! Two implementations exist for different hosts. They differ only in how
//! they source entropy and compare secrets; the PBKDF2/HMAC/HKDF/AES code is
//! shared, so both produce byte-identical outputs for identical inputs.
//!
//! Pick one with [`select`] once at startup and hand it to
//! [`CryptoService::new`](crate::CryptoService::new).

use std::fmt;
use std::sync::Arc;

use aes::{Aes128, Aes192, Aes256};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::scheme::HashAlgorithm;
use crate::IV_SIZE;

/// The primitive operations the envelope engine needs from its host.
pub trait CryptoBackend: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Fill `len` bytes from a cryptographically secure source.
    fn random_bytes(&self, len: usize) -> CryptoResult<Vec<u8>>;

    /// PBKDF2-HMAC producing exactly one hash-length block.
    fn pbkdf2(
        &self,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
        hash: HashAlgorithm,
    ) -> CryptoResult<Zeroizing<Vec<u8>>>;

    fn hmac(&self, key: &[u8], data: &[u8], hash: HashAlgorithm) -> CryptoResult<Vec<u8>>;

    /// HKDF-Expand (RFC 5869 §2.3). `prk` must be at least one hash length
    /// and `len` at most 255 hash lengths.
    fn hkdf_expand(
        &self,
        prk: &[u8],
        info: &[u8],
        len: usize,
        hash: HashAlgorithm,
    ) -> CryptoResult<Zeroizing<Vec<u8>>>;

    /// AES-CBC with PKCS#7 padding; AES-128/192/256 chosen by key length.
    fn aes_cbc_encrypt(
        &self,
        plaintext: &[u8],
        iv: &[u8; IV_SIZE],
        key: &[u8],
    ) -> CryptoResult<Vec<u8>>;

    fn aes_cbc_decrypt(
        &self,
        ciphertext: &[u8],
        iv: &[u8; IV_SIZE],
        key: &[u8],
    ) -> CryptoResult<Zeroizing<Vec<u8>>>;

    /// Equality that does not leak the position of the first differing byte.
    /// Unequal lengths return `false` immediately.
    fn constant_time_eq(&self, a: &[u8], b: &[u8]) -> bool;
}

/// Which backend to construct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Native on regular targets, portable on wasm32.
    #[default]
    Auto,
    Native,
    Portable,
}

impl std::str::FromStr for BackendKind {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "native" => Ok(Self::Native),
            "portable" => Ok(Self::Portable),
            other => Err(CryptoError::config(format!("unknown backend: {other}"))),
        }
    }
}

/// Build the backend for `kind`, resolving `Auto` against the compile target.
pub fn select(kind: BackendKind) -> Arc<dyn CryptoBackend> {
    let resolved = match kind {
        BackendKind::Auto if cfg!(target_arch = "wasm32") => BackendKind::Portable,
        BackendKind::Auto => BackendKind::Native,
        other => other,
    };
    let backend: Arc<dyn CryptoBackend> = match resolved {
        BackendKind::Portable => Arc::new(PortableBackend),
        _ => Arc::new(RustCryptoBackend),
    };
    tracing::debug!(requested = ?kind, backend = backend.name(), "selected crypto backend");
    backend
}

/// Backend for native targets: thread-local CSPRNG and `subtle` comparison.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustCryptoBackend;

impl CryptoBackend for RustCryptoBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn random_bytes(&self, len: usize) -> CryptoResult<Vec<u8>> {
        let mut bytes = vec![0u8; len];
        rand::thread_rng()
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::backend(format!("CSPRNG failure: {e}")))?;
        Ok(bytes)
    }

    fn pbkdf2(
        &self,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
        hash: HashAlgorithm,
    ) -> CryptoResult<Zeroizing<Vec<u8>>> {
        Ok(pbkdf2_hmac(password, salt, iterations, hash))
    }

    fn hmac(&self, key: &[u8], data: &[u8], hash: HashAlgorithm) -> CryptoResult<Vec<u8>> {
        hmac_digest(key, data, hash)
    }

    fn hkdf_expand(
        &self,
        prk: &[u8],
        info: &[u8],
        len: usize,
        hash: HashAlgorithm,
    ) -> CryptoResult<Zeroizing<Vec<u8>>> {
        hkdf_expand(prk, info, len, hash)
    }

    fn aes_cbc_encrypt(
        &self,
        plaintext: &[u8],
        iv: &[u8; IV_SIZE],
        key: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        cbc_encrypt(plaintext, iv, key)
    }

    fn aes_cbc_decrypt(
        &self,
        ciphertext: &[u8],
        iv: &[u8; IV_SIZE],
        key: &[u8],
    ) -> CryptoResult<Zeroizing<Vec<u8>>> {
        cbc_decrypt(ciphertext, iv, key)
    }

    fn constant_time_eq(&self, a: &[u8], b: &[u8]) -> bool {
        if a.len() != b.len() {
            return false;
        }
        a.ct_eq(b).into()
    }
}

/// Backend for hosts without thread-local state (wasm32 + browser crypto).
///
/// Comparison uses the double-HMAC strategy: both inputs are MACed under a
/// fresh random key and the tags compared, so timing depends only on the
/// random tags.
#[derive(Debug, Default, Clone, Copy)]
pub struct PortableBackend;

impl CryptoBackend for PortableBackend {
    fn name(&self) -> &'static str {
        "portable"
    }

    fn random_bytes(&self, len: usize) -> CryptoResult<Vec<u8>> {
        let mut bytes = vec![0u8; len];
        getrandom::getrandom(&mut bytes)
            .map_err(|e| CryptoError::backend(format!("CSPRNG failure: {e}")))?;
        Ok(bytes)
    }

    fn pbkdf2(
        &self,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
        hash: HashAlgorithm,
    ) -> CryptoResult<Zeroizing<Vec<u8>>> {
        Ok(pbkdf2_hmac(password, salt, iterations, hash))
    }

    fn hmac(&self, key: &[u8], data: &[u8], hash: HashAlgorithm) -> CryptoResult<Vec<u8>> {
        hmac_digest(key, data, hash)
    }

    fn hkdf_expand(
        &self,
        prk: &[u8],
        info: &[u8],
        len: usize,
        hash: HashAlgorithm,
    ) -> CryptoResult<Zeroizing<Vec<u8>>> {
        hkdf_expand(prk, info, len, hash)
    }

    fn aes_cbc_encrypt(
        &self,
        plaintext: &[u8],
        iv: &[u8; IV_SIZE],
        key: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        cbc_encrypt(plaintext, iv, key)
    }

    fn aes_cbc_decrypt(
        &self,
        ciphertext: &[u8],
        iv: &[u8; IV_SIZE],
        key: &[u8],
    ) -> CryptoResult<Zeroizing<Vec<u8>>> {
        cbc_decrypt(ciphertext, iv, key)
    }

    fn constant_time_eq(&self, a: &[u8], b: &[u8]) -> bool {
        if a.len() != b.len() {
            return false;
        }
        let Ok(key) = self.random_bytes(32).map(Zeroizing::new) else {
            return false;
        };
        let tag_a = hmac_digest(&key, a, HashAlgorithm::Sha256);
        let tag_b = hmac_digest(&key, b, HashAlgorithm::Sha256);
        match (tag_a, tag_b) {
            (Ok(tag_a), Ok(tag_b)) => tag_a.ct_eq(&tag_b).into(),
            _ => false,
        }
    }
}

fn pbkdf2_hmac(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    hash: HashAlgorithm,
) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(vec![0u8; hash.output_len()]);
    match hash {
        HashAlgorithm::Sha256 => {
            pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out)
        }
        HashAlgorithm::Sha512 => {
            pbkdf2::pbkdf2_hmac::<Sha512>(password, salt, iterations, &mut out)
        }
    }
    out
}

fn hmac_digest(key: &[u8], data: &[u8], hash: HashAlgorithm) -> CryptoResult<Vec<u8>> {
    let tag = match hash {
        HashAlgorithm::Sha256 => {
            let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key)
                .map_err(hmac_key_rejected)?;
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        HashAlgorithm::Sha512 => {
            let mut mac = <Hmac<Sha512> as Mac>::new_from_slice(key)
                .map_err(hmac_key_rejected)?;
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
    };
    Ok(tag)
}

fn hmac_key_rejected(e: hmac::digest::InvalidLength) -> CryptoError {
    CryptoError::backend(format!("HMAC key rejected: {e}"))
}

fn hkdf_expand(
    prk: &[u8],
    info: &[u8],
    len: usize,
    hash: HashAlgorithm,
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let mut okm = Zeroizing::new(vec![0u8; len]);
    match hash {
        HashAlgorithm::Sha256 => Hkdf::<Sha256>::from_prk(prk)
            .map_err(|e| hkdf_prk_rejected(prk.len(), hash, e))?
            .expand(info, &mut okm)
            .map_err(|e| hkdf_output_rejected(len, hash, e))?,
        HashAlgorithm::Sha512 => Hkdf::<Sha512>::from_prk(prk)
            .map_err(|e| hkdf_prk_rejected(prk.len(), hash, e))?
            .expand(info, &mut okm)
            .map_err(|e| hkdf_output_rejected(len, hash, e))?,
    }
    Ok(okm)
}

fn hkdf_prk_rejected(len: usize, hash: HashAlgorithm, e: hkdf::InvalidPrkLength) -> CryptoError {
    CryptoError::config(format!(
        "HKDF PRK of {len} bytes is shorter than the {hash} output ({}): {e}",
        hash.output_len()
    ))
}

fn hkdf_output_rejected(len: usize, hash: HashAlgorithm, e: hkdf::InvalidLength) -> CryptoError {
    CryptoError::config(format!(
        "HKDF output of {len} bytes exceeds 255 * {}: {e}",
        hash.output_len()
    ))
}

fn cbc_encrypt(plaintext: &[u8], iv: &[u8; IV_SIZE], key: &[u8]) -> CryptoResult<Vec<u8>> {
    let ciphertext = match key.len() {
        16 => cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
            .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
        24 => cbc::Encryptor::<Aes192>::new_from_slices(key, iv)
            .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
        32 => cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
            .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
        other => return Err(invalid_aes_key(other)),
    };
    ciphertext.map_err(cbc_setup_failed)
}

fn cbc_decrypt(
    ciphertext: &[u8],
    iv: &[u8; IV_SIZE],
    key: &[u8],
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let plaintext = match key.len() {
        16 => cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
            .map(|c| c.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)),
        24 => cbc::Decryptor::<Aes192>::new_from_slices(key, iv)
            .map(|c| c.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)),
        32 => cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
            .map(|c| c.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)),
        other => return Err(invalid_aes_key(other)),
    };
    // Padding and length failures share one message.
    plaintext
        .map_err(cbc_setup_failed)?
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::backend("decryption failed"))
}

fn cbc_setup_failed(e: cbc::cipher::InvalidLength) -> CryptoError {
    CryptoError::backend(format!("AES-CBC setup failed: {e}"))
}

fn invalid_aes_key(len: usize) -> CryptoError {
    CryptoError::config(format!(
        "invalid AES key length: {} bits (expected 128, 192 or 256)",
        len * 8
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backends() -> [Arc<dyn CryptoBackend>; 2] {
        [Arc::new(RustCryptoBackend), Arc::new(PortableBackend)]
    }

    fn decode_hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn random_bytes_have_requested_length_and_differ() {
        for backend in backends() {
            let a = backend.random_bytes(32).unwrap();
            let b = backend.random_bytes(32).unwrap();
            assert_eq!(a.len(), 32);
            assert_ne!(a, b, "{} must not repeat output", backend.name());
        }
    }

    #[test]
    fn pbkdf2_sha256_rfc7914_vector() {
        // RFC 7914 §11, first 32 bytes of the 64-byte output.
        let expected = decode_hex(
            "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc",
        );
        for backend in backends() {
            let out = backend
                .pbkdf2(b"passwd", b"salt", 1, HashAlgorithm::Sha256)
                .unwrap();
            assert_eq!(&out[..], &expected[..]);
        }
    }

    #[test]
    fn pbkdf2_output_length_follows_hash() {
        let backend = RustCryptoBackend;
        let short = backend.pbkdf2(b"pw", b"salt", 2, HashAlgorithm::Sha256);
        let long = backend.pbkdf2(b"pw", b"salt", 2, HashAlgorithm::Sha512);
        assert_eq!(short.unwrap().len(), 32);
        assert_eq!(long.unwrap().len(), 64);
    }

    #[test]
    fn hmac_sha256_rfc4231_case_2() {
        let expected = decode_hex(
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843",
        );
        let data = b"what do ya want for nothing?";
        for backend in backends() {
            let tag = backend.hmac(b"Jefe", data, HashAlgorithm::Sha256).unwrap();
            assert_eq!(tag, expected);
        }
    }

    #[test]
    fn hkdf_expand_rfc5869_case_1() {
        let prk = decode_hex(
            "077709362c2e32df0ddc3f0dc47bba6390b6c73bb50f9c3122ec844ad7c2b3e5",
        );
        let info = decode_hex("f0f1f2f3f4f5f6f7f8f9");
        let expected = decode_hex(
            "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865",
        );
        for backend in backends() {
            let okm = backend
                .hkdf_expand(&prk, &info, 42, HashAlgorithm::Sha256)
                .unwrap();
            assert_eq!(&okm[..], &expected[..]);
        }
    }

    #[test]
    fn hkdf_expand_rfc5869_case_3_empty_info() {
        let prk = decode_hex(
            "19ef24a32c717b167f33a91d6f648bdf96596776afdb6377ac434c1c293ccb04",
        );
        let expected = decode_hex(
            "8da4e775a563c18f715f802a063c5a31b8a11f5c5ee1879ec3454e5f3c738d2d9d201395faa4b61a96c8",
        );
        for backend in backends() {
            let okm = backend
                .hkdf_expand(&prk, b"", 42, HashAlgorithm::Sha256)
                .unwrap();
            assert_eq!(&okm[..], &expected[..]);
        }
    }

    #[test]
    fn hkdf_expand_rejects_oversized_output() {
        let backend = RustCryptoBackend;
        let hash = HashAlgorithm::Sha256;
        let prk = [0u8; 32];
        let max = 255 * 32;

        let err = backend.hkdf_expand(&prk, b"enc", max + 1, hash);
        assert!(matches!(err, Err(CryptoError::Config(_))));

        let okm = backend.hkdf_expand(&prk, b"enc", max, hash);
        assert_eq!(okm.unwrap().len(), max);
    }

    #[test]
    fn hkdf_expand_rejects_short_prk() {
        let backend = RustCryptoBackend;
        let prk = [0u8; 32];
        let err = backend.hkdf_expand(&prk, b"mac", 64, HashAlgorithm::Sha512);
        assert!(matches!(err, Err(CryptoError::Config(_))));
    }

    #[test]
    fn aes_cbc_roundtrip_all_key_sizes() {
        let iv = [7u8; IV_SIZE];
        for len in [16, 24, 32] {
            let key = vec![0x42u8; len];
            for backend in backends() {
                let ct = backend.aes_cbc_encrypt(b"block cipher", &iv, &key).unwrap();
                assert_eq!(ct.len(), 16);
                let pt = backend.aes_cbc_decrypt(&ct, &iv, &key).unwrap();
                assert_eq!(&pt[..], b"block cipher");
            }
        }
    }

    #[test]
    fn aes_cbc_rejects_other_key_lengths() {
        let iv = [0u8; IV_SIZE];
        for len in [0, 15, 20, 33, 64] {
            let key = vec![0u8; len];
            let err = RustCryptoBackend
                .aes_cbc_encrypt(b"x", &iv, &key)
                .unwrap_err();
            assert!(matches!(err, CryptoError::Config(_)), "len {len}");
        }
    }

    #[test]
    fn aes_cbc_bad_ciphertext_is_generic_backend_error() {
        let iv = [0u8; IV_SIZE];
        let key = [1u8; 32];
        let err = RustCryptoBackend
            .aes_cbc_decrypt(&[0u8; 15], &iv, &key)
            .unwrap_err();
        assert!(matches!(err, CryptoError::Backend(_)));
    }

    #[test]
    fn constant_time_eq_semantics() {
        for backend in backends() {
            assert!(backend.constant_time_eq(b"same bytes", b"same bytes"));
            assert!(!backend.constant_time_eq(b"same bytes", b"same bytez"));
            assert!(!backend.constant_time_eq(b"short", b"longer input"));
            assert!(backend.constant_time_eq(b"", b""));
        }
    }

    #[test]
    fn select_resolves_auto() {
        let backend = select(BackendKind::Auto);
        let expected = if cfg!(target_arch = "wasm32") {
            "portable"
        } else {
            "native"
        };
        assert_eq!(backend.name(), expected);
        assert_eq!(select(BackendKind::Portable).name(), "portable");
        assert_eq!(select(BackendKind::Native).name(), "native");
    }

    #[test]
    fn backend_kind_parses() {
        let kind: BackendKind = "Portable".parse().unwrap();
        assert_eq!(kind, BackendKind::Portable);
        assert!("openssl".parse::<BackendKind>().is_err());
    }
}
