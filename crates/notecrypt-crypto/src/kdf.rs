//! Key derivation: password → raw master key, and the server-side verifier.

use zeroize::Zeroizing;

use crate::backend::CryptoBackend;
use crate::error::{CryptoError, CryptoResult};
use crate::scheme::KdfScheme;

/// Run the password KDF.
///
/// Output length follows the scheme's hash: 32 bytes for PBKDF2-SHA256,
/// 64 for PBKDF2-SHA512. The reserved Argon2id scheme and a zero
/// iteration count fail with [`CryptoError::Config`].
pub fn derive_key(
    backend: &dyn CryptoBackend,
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    kdf: KdfScheme,
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let hash = kdf.hash_algorithm()?;
    if iterations == 0 {
        return Err(CryptoError::config("iteration count must be at least 1"));
    }
    tracing::debug!(kdf = %kdf, iterations, "deriving master key");
    backend.pbkdf2(password, salt, iterations, hash)
}

/// Derive the one-way password verifier sent to the verification boundary.
///
/// `PBKDF2(password = master_key, salt = password, rounds = 1)` using the
/// same hash family as the master key derivation. The verifier cannot be
/// turned back into the master key.
pub fn derive_password_verifier(
    backend: &dyn CryptoBackend,
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    kdf: KdfScheme,
) -> CryptoResult<Vec<u8>> {
    let hash = kdf.hash_algorithm()?;
    let master = derive_key(backend, password, salt, iterations, kdf)?;
    let verifier = backend.pbkdf2(&master, password, 1, hash)?;
    Ok(verifier.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RustCryptoBackend;
    use crate::HashAlgorithm;

    const SHA256: KdfScheme = KdfScheme::Pbkdf2Sha256;
    const SHA512: KdfScheme = KdfScheme::Pbkdf2Sha512;

    fn derive(password: &[u8], salt: &[u8], rounds: u32, kdf: KdfScheme) -> Vec<u8> {
        let key = derive_key(&RustCryptoBackend, password, salt, rounds, kdf);
        key.unwrap().to_vec()
    }

    #[test]
    fn test_kdf_deterministic() {
        let key1 = derive(b"test-passphrase-123", b"salt", 1000, SHA256);
        let key2 = derive(b"test-passphrase-123", b"salt", 1000, SHA256);

        assert_eq!(key1, key2, "KDF must be deterministic");
    }

    #[test]
    fn test_kdf_output_lengths() {
        assert_eq!(derive(b"pw", b"salt", 10, SHA256).len(), 32);
        assert_eq!(derive(b"pw", b"salt", 10, SHA512).len(), 64);
    }

    #[test]
    fn test_kdf_different_passphrases() {
        let key1 = derive(b"passphrase-a", b"salt", 10, SHA256);
        let key2 = derive(b"passphrase-b", b"salt", 10, SHA256);

        assert_ne!(key1, key2, "distinct passphrases, distinct keys");
    }

    #[test]
    fn test_kdf_different_salts() {
        let key1 = derive(b"same", &[1u8; 16], 10, SHA256);
        let key2 = derive(b"same", &[2u8; 16], 10, SHA256);

        assert_ne!(key1, key2, "distinct salts, distinct keys");
    }

    #[test]
    fn test_argon2id_reserved() {
        let backend = RustCryptoBackend;
        let kdf = KdfScheme::Argon2id;
        let err = derive_key(&backend, b"pw", b"salt", 10, kdf).unwrap_err();
        assert!(matches!(err, CryptoError::Config(_)));

        let err = derive_password_verifier(&backend, b"pw", b"salt", 10, kdf);
        assert!(matches!(err, Err(CryptoError::Config(_))));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let backend = RustCryptoBackend;
        for kdf in [SHA256, SHA512] {
            let err = derive_key(&backend, b"pw", b"salt", 0, kdf).unwrap_err();
            assert!(matches!(err, CryptoError::Config(_)), "{kdf}");

            let err = derive_password_verifier(&backend, b"pw", b"salt", 0, kdf);
            assert!(matches!(err, Err(CryptoError::Config(_))), "{kdf}");
        }
        assert_eq!(derive(b"pw", b"salt", 1, SHA256).len(), 32);
    }

    #[test]
    fn test_verifier_is_second_round_over_password() {
        let backend = RustCryptoBackend;
        let master = derive(b"pw", b"salt", 10, SHA512);
        let expected = backend
            .pbkdf2(&master, b"pw", 1, HashAlgorithm::Sha512)
            .unwrap();

        let verifier = derive_password_verifier(&backend, b"pw", b"salt", 10, SHA512);
        let verifier = verifier.unwrap();

        assert_eq!(verifier, expected.to_vec());
        assert_ne!(verifier, master, "verifier must differ from the master key");
    }
}
