//! Scheme tables: encryption schemes, KDF schemes, and the per-account KDF config.
//!
//! Every key-length and wire-shape check in the crate reads from the methods
//! on [`EncryptionScheme`]; nothing else hard-codes those numbers.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};

/// PBKDF2 rounds used for new accounts.
pub const DEFAULT_ITERATIONS: u32 = 600_000;

/// Smallest salt accepted for a new account.
pub const MIN_SALT_LEN: usize = 16;

/// Wire ids held back for asymmetric schemes that are not implemented.
pub const RESERVED_SCHEME_IDS: RangeInclusive<u8> = 3..=6;

/// Hash family used by PBKDF2, HMAC and HKDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    pub fn output_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha512 => 64,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256 => f.write_str("SHA-256"),
            Self::Sha512 => f.write_str("SHA-512"),
        }
    }
}

/// Symmetric envelope scheme. Discriminants are the wire ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptionScheme {
    #[serde(rename = "AesCbc256")]
    AesCbc256 = 0,
    #[serde(rename = "AesCbc128_HmacSha256")]
    AesCbc128HmacSha256 = 1,
    #[serde(rename = "AesCbc256_HmacSha256")]
    AesCbc256HmacSha256 = 2,
    #[serde(rename = "AesCbc256_HmacSha512")]
    AesCbc256HmacSha512 = 7,
}

impl EncryptionScheme {
    pub const ALL: [EncryptionScheme; 4] = [
        Self::AesCbc256,
        Self::AesCbc128HmacSha256,
        Self::AesCbc256HmacSha256,
        Self::AesCbc256HmacSha512,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Look up a scheme by wire id. Reserved and unknown ids both yield `None`;
    /// see [`RESERVED_SCHEME_IDS`] to tell them apart.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::AesCbc256),
            1 => Some(Self::AesCbc128HmacSha256),
            2 => Some(Self::AesCbc256HmacSha256),
            7 => Some(Self::AesCbc256HmacSha512),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::AesCbc256 => "AesCbc256",
            Self::AesCbc128HmacSha256 => "AesCbc128_HmacSha256",
            Self::AesCbc256HmacSha256 => "AesCbc256_HmacSha256",
            Self::AesCbc256HmacSha512 => "AesCbc256_HmacSha512",
        }
    }

    /// Length of a [`SymmetricCryptoKey`](crate::SymmetricCryptoKey) for this scheme.
    pub fn total_key_len(self) -> usize {
        self.enc_key_len() + self.mac_len()
    }

    pub fn enc_key_len(self) -> usize {
        match self {
            Self::AesCbc128HmacSha256 => 16,
            Self::AesCbc256 | Self::AesCbc256HmacSha256 | Self::AesCbc256HmacSha512 => 32,
        }
    }

    /// MAC key length, which is also the MAC tag length.
    pub fn mac_len(self) -> usize {
        self.mac_algorithm().map_or(0, HashAlgorithm::output_len)
    }

    pub fn mac_algorithm(self) -> Option<HashAlgorithm> {
        match self {
            Self::AesCbc256 => None,
            Self::AesCbc128HmacSha256 | Self::AesCbc256HmacSha256 => Some(HashAlgorithm::Sha256),
            Self::AesCbc256HmacSha512 => Some(HashAlgorithm::Sha512),
        }
    }

    /// Number of `|`-separated fields in the text envelope.
    pub fn text_part_count(self) -> usize {
        if self.mac_algorithm().is_some() {
            3
        } else {
            2
        }
    }

    /// Smallest raw key the stretcher accepts for this scheme.
    pub fn min_stretch_input_len(self) -> usize {
        match self {
            Self::AesCbc256 => 32,
            Self::AesCbc128HmacSha256 | Self::AesCbc256HmacSha256 => 32,
            Self::AesCbc256HmacSha512 => 64,
        }
    }

    /// Check a raw key length against the stretch input rule.
    ///
    /// `AesCbc256` takes the raw key as-is, so it must be exactly 32 bytes.
    pub fn check_stretch_input(self, len: usize) -> CryptoResult<()> {
        let min = self.min_stretch_input_len();
        match self {
            Self::AesCbc256 if len != min => Err(CryptoError::config(format!(
                "{self} requires a {min}-byte key, got {len} (truncation is disallowed)"
            ))),
            _ if len < min => Err(CryptoError::config(format!(
                "{self} requires a key of at least {min} bytes, got {len}"
            ))),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for EncryptionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EncryptionScheme {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scheme| scheme.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| CryptoError::config(format!("unsupported encryption scheme: {s}")))
    }
}

/// Password KDF. Discriminants are the persisted ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KdfScheme {
    #[serde(rename = "PBKDF2-SHA256")]
    Pbkdf2Sha256 = 0,
    /// Reserved. Every use fails with [`CryptoError::Config`].
    #[serde(rename = "Argon2id")]
    Argon2id = 1,
    #[serde(rename = "PBKDF2-SHA512")]
    Pbkdf2Sha512 = 2,
}

impl KdfScheme {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Pbkdf2Sha256 => "PBKDF2-SHA256",
            Self::Argon2id => "Argon2id",
            Self::Pbkdf2Sha512 => "PBKDF2-SHA512",
        }
    }

    pub fn hash_algorithm(self) -> CryptoResult<HashAlgorithm> {
        match self {
            Self::Pbkdf2Sha256 => Ok(HashAlgorithm::Sha256),
            Self::Pbkdf2Sha512 => Ok(HashAlgorithm::Sha512),
            Self::Argon2id => Err(CryptoError::config(
                "KDF scheme Argon2id is reserved and not implemented",
            )),
        }
    }

    /// Bytes produced by [`derive_key`](crate::kdf::derive_key).
    pub fn output_len(self) -> CryptoResult<usize> {
        self.hash_algorithm().map(HashAlgorithm::output_len)
    }
}

impl fmt::Display for KdfScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KdfScheme {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.replace('_', "-");
        [Self::Pbkdf2Sha256, Self::Argon2id, Self::Pbkdf2Sha512]
            .into_iter()
            .find(|kdf| kdf.name().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| CryptoError::config(format!("unsupported KDF scheme: {s}")))
    }
}

/// Per-account KDF parameters, fixed at signup.
///
/// Changing any field makes previously derived keys unrecoverable, so the
/// value is immutable: build a new one instead. Construction rejects
/// combinations whose KDF output cannot feed the scheme's stretcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "KdfConfigRecord")]
pub struct KdfConfig {
    kdf: KdfScheme,
    encryption: EncryptionScheme,
    iterations: u32,
}

#[derive(Deserialize)]
struct KdfConfigRecord {
    kdf: KdfScheme,
    encryption: EncryptionScheme,
    iterations: u32,
}

impl TryFrom<KdfConfigRecord> for KdfConfig {
    type Error = CryptoError;

    fn try_from(record: KdfConfigRecord) -> Result<Self, Self::Error> {
        Self::new(record.kdf, record.encryption, record.iterations)
    }
}

impl KdfConfig {
    pub fn new(
        kdf: KdfScheme,
        encryption: EncryptionScheme,
        iterations: u32,
    ) -> CryptoResult<Self> {
        if iterations == 0 {
            return Err(CryptoError::config("iteration count must be at least 1"));
        }
        let output_len = kdf.output_len()?;
        encryption.check_stretch_input(output_len).map_err(|_| {
            CryptoError::config(format!(
                "{kdf} produces {output_len} bytes, incompatible with {encryption}"
            ))
        })?;
        Ok(Self {
            kdf,
            encryption,
            iterations,
        })
    }

    pub fn kdf(&self) -> KdfScheme {
        self.kdf
    }

    pub fn encryption(&self) -> EncryptionScheme {
        self.encryption
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            kdf: KdfScheme::Pbkdf2Sha256,
            encryption: EncryptionScheme::AesCbc256HmacSha256,
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_table() {
        let rows = [
            (EncryptionScheme::AesCbc256, 0, 32, 0, 2),
            (EncryptionScheme::AesCbc128HmacSha256, 1, 48, 32, 3),
            (EncryptionScheme::AesCbc256HmacSha256, 2, 64, 32, 3),
            (EncryptionScheme::AesCbc256HmacSha512, 7, 96, 64, 3),
        ];
        for (scheme, id, key_len, mac_len, parts) in rows {
            assert_eq!(scheme.id(), id);
            assert_eq!(scheme.total_key_len(), key_len, "{scheme}");
            assert_eq!(scheme.mac_len(), mac_len, "{scheme}");
            assert_eq!(scheme.text_part_count(), parts, "{scheme}");
            assert_eq!(EncryptionScheme::from_id(id), Some(scheme));
        }
    }

    #[test]
    fn reserved_and_unknown_ids_do_not_resolve() {
        for id in RESERVED_SCHEME_IDS.chain([8, 99, 255]) {
            assert_eq!(EncryptionScheme::from_id(id), None, "id {id}");
        }
    }

    #[test]
    fn scheme_names_roundtrip() {
        for scheme in EncryptionScheme::ALL {
            assert_eq!(scheme.name().parse::<EncryptionScheme>().unwrap(), scheme);
        }
        assert!("Rsa2048_OaepSha256".parse::<EncryptionScheme>().is_err());
    }

    #[test]
    fn kdf_names_accept_both_separators() {
        let upper: KdfScheme = "PBKDF2_SHA512".parse().unwrap();
        let lower: KdfScheme = "pbkdf2-sha256".parse().unwrap();
        assert_eq!(upper, KdfScheme::Pbkdf2Sha512);
        assert_eq!(lower, KdfScheme::Pbkdf2Sha256);
    }

    #[test]
    fn argon2id_is_explicitly_rejected() {
        let err = KdfScheme::Argon2id.hash_algorithm().unwrap_err();
        assert!(matches!(err, CryptoError::Config(_)));
        let config = KdfConfig::new(KdfScheme::Argon2id, EncryptionScheme::AesCbc256, 1);
        assert!(config.is_err());
    }

    #[test]
    fn aes_cbc_256_rejects_truncation() {
        assert!(EncryptionScheme::AesCbc256.check_stretch_input(32).is_ok());
        assert!(EncryptionScheme::AesCbc256.check_stretch_input(64).is_err());
        assert!(EncryptionScheme::AesCbc256.check_stretch_input(16).is_err());
    }

    #[test]
    fn incompatible_kdf_pairs_are_config_errors() {
        let sha256_into_512 = KdfConfig::new(
            KdfScheme::Pbkdf2Sha256,
            EncryptionScheme::AesCbc256HmacSha512,
            1000,
        );
        assert!(matches!(sha256_into_512, Err(CryptoError::Config(_))));

        let sha512_into_plain =
            KdfConfig::new(KdfScheme::Pbkdf2Sha512, EncryptionScheme::AesCbc256, 1000);
        assert!(matches!(sha512_into_plain, Err(CryptoError::Config(_))));
    }

    #[test]
    fn compatible_kdf_pairs() {
        let pairs = [
            (KdfScheme::Pbkdf2Sha256, EncryptionScheme::AesCbc256),
            (KdfScheme::Pbkdf2Sha256, EncryptionScheme::AesCbc128HmacSha256),
            (KdfScheme::Pbkdf2Sha256, EncryptionScheme::AesCbc256HmacSha256),
            (KdfScheme::Pbkdf2Sha512, EncryptionScheme::AesCbc128HmacSha256),
            (KdfScheme::Pbkdf2Sha512, EncryptionScheme::AesCbc256HmacSha256),
            (KdfScheme::Pbkdf2Sha512, EncryptionScheme::AesCbc256HmacSha512),
        ];
        for (kdf, enc) in pairs {
            assert!(KdfConfig::new(kdf, enc, 1).is_ok(), "{kdf} + {enc}");
        }
    }

    #[test]
    fn zero_iterations_rejected() {
        let config = KdfConfig::new(KdfScheme::Pbkdf2Sha256, EncryptionScheme::AesCbc256, 0);
        assert!(matches!(config, Err(CryptoError::Config(_))));
    }

    #[test]
    fn default_config() {
        let config = KdfConfig::default();
        assert_eq!(config.kdf(), KdfScheme::Pbkdf2Sha256);
        assert_eq!(config.encryption(), EncryptionScheme::AesCbc256HmacSha256);
        assert_eq!(config.iterations(), 600_000);
    }

    #[test]
    fn kdf_config_json_goes_through_validation() {
        let json = serde_json::to_string(&KdfConfig::default()).unwrap();
        assert_eq!(
            json,
            r#"{"kdf":"PBKDF2-SHA256","encryption":"AesCbc256_HmacSha256","iterations":600000}"#
        );
        let back: KdfConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, KdfConfig::default());

        let bad = r#"{"kdf":"PBKDF2-SHA256","encryption":"AesCbc256_HmacSha512","iterations":1}"#;
        assert!(serde_json::from_str::<KdfConfig>(bad).is_err());
    }
}
