//! AES-CBC and encrypt-then-MAC helpers.
//!
//! The MAC covers `iv || ciphertext`, never the plaintext.

use zeroize::Zeroizing;

use crate::backend::CryptoBackend;
use crate::error::CryptoResult;
use crate::scheme::HashAlgorithm;
use crate::IV_SIZE;

pub fn aes_cbc_encrypt(
    backend: &dyn CryptoBackend,
    plaintext: &[u8],
    iv: &[u8; IV_SIZE],
    enc_key: &[u8],
) -> CryptoResult<Vec<u8>> {
    backend.aes_cbc_encrypt(plaintext, iv, enc_key)
}

pub fn aes_cbc_decrypt(
    backend: &dyn CryptoBackend,
    ciphertext: &[u8],
    iv: &[u8; IV_SIZE],
    enc_key: &[u8],
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    backend.aes_cbc_decrypt(ciphertext, iv, enc_key)
}

/// `HMAC(hash, mac_key, iv || ciphertext)`
pub fn generate_mac(
    backend: &dyn CryptoBackend,
    iv: &[u8],
    ciphertext: &[u8],
    mac_key: &[u8],
    hash: HashAlgorithm,
) -> CryptoResult<Vec<u8>> {
    let mut data = Vec::with_capacity(iv.len() + ciphertext.len());
    data.extend_from_slice(iv);
    data.extend_from_slice(ciphertext);
    backend.hmac(mac_key, &data, hash)
}

/// Recompute the MAC and compare in constant time.
pub fn verify_mac(
    backend: &dyn CryptoBackend,
    iv: &[u8],
    ciphertext: &[u8],
    mac: &[u8],
    mac_key: &[u8],
    hash: HashAlgorithm,
) -> CryptoResult<bool> {
    if mac.len() != hash.output_len() {
        return Ok(false);
    }
    let expected = generate_mac(backend, iv, ciphertext, mac_key, hash)?;
    Ok(backend.constant_time_eq(&expected, mac))
}
