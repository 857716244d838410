use notecrypt_crypto::{
    BackendKind, EncryptionScheme, EnvelopeEncoding, KdfConfig, KdfScheme, DEFAULT_ITERATIONS,
};
use serde::{Deserialize, Serialize};

use crate::error::{NotecryptError, NotecryptResult};

/// Top-level configuration (loaded from notecrypt.toml)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotecryptConfig {
    pub logging: LoggingConfig,
    pub kdf: KdfSection,
    pub crypto: CryptoSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or EnvFilter directive (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

/// Password KDF parameters used when creating new accounts.
///
/// Existing accounts keep the parameters stored in their key record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfSection {
    pub kdf: KdfScheme,
    pub encryption: EncryptionScheme,
    pub iterations: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoSection {
    /// "auto", "native" or "portable"
    pub backend: BackendKind,
    /// Envelope form written by `encrypt`: "text" or "binary"
    pub encoding: EnvelopeEncoding,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for KdfSection {
    fn default() -> Self {
        Self {
            kdf: KdfScheme::Pbkdf2Sha256,
            encryption: EncryptionScheme::AesCbc256HmacSha256,
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl NotecryptConfig {
    /// Parse a TOML document. Missing sections and keys take their defaults.
    pub fn from_toml_str(content: &str) -> NotecryptResult<Self> {
        toml::from_str(content).map_err(config_error)
    }

    pub fn to_toml_string(&self) -> NotecryptResult<String> {
        toml::to_string_pretty(self).map_err(config_error)
    }

    /// Validated KDF parameters for new accounts.
    pub fn kdf_config(&self) -> NotecryptResult<KdfConfig> {
        let KdfSection {
            kdf,
            encryption,
            iterations,
        } = self.kdf;
        Ok(KdfConfig::new(kdf, encryption, iterations)?)
    }
}

fn config_error(e: impl std::fmt::Display) -> NotecryptError {
    NotecryptError::Config(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[logging]
level = "debug"
format = "json"

[kdf]
kdf = "PBKDF2-SHA512"
encryption = "AesCbc256_HmacSha512"
iterations = 210000

[crypto]
backend = "portable"
encoding = "binary"
"#;
        let config = NotecryptConfig::from_toml_str(toml_str).unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.kdf.kdf, KdfScheme::Pbkdf2Sha512);
        assert_eq!(config.kdf.encryption, EncryptionScheme::AesCbc256HmacSha512);
        assert_eq!(config.kdf.iterations, 210_000);
        assert_eq!(config.crypto.backend, BackendKind::Portable);
        assert_eq!(config.crypto.encoding, EnvelopeEncoding::Binary);

        let kdf = config.kdf_config().unwrap();
        assert_eq!(kdf.iterations(), 210_000);
    }

    #[test]
    fn test_parse_defaults() {
        let config = NotecryptConfig::from_toml_str("").unwrap();

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "text");
        assert_eq!(config.crypto.backend, BackendKind::Auto);
        assert_eq!(config.crypto.encoding, EnvelopeEncoding::Text);
        assert_eq!(config.kdf_config().unwrap(), KdfConfig::default());
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[kdf]
iterations = 100000
"#;
        let config = NotecryptConfig::from_toml_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.kdf.iterations, 100_000);
        // Defaults
        assert_eq!(config.kdf.kdf, KdfScheme::Pbkdf2Sha256);
        assert_eq!(config.kdf.encryption, EncryptionScheme::AesCbc256HmacSha256);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_unknown_scheme_rejected() {
        let toml_str = r#"
[kdf]
encryption = "Rsa2048_OaepSha256"
"#;
        assert!(matches!(
            NotecryptConfig::from_toml_str(toml_str),
            Err(NotecryptError::Config(_))
        ));
    }

    #[test]
    fn test_incompatible_kdf_is_crypto_error() {
        let toml_str = r#"
[kdf]
kdf = "PBKDF2-SHA256"
encryption = "AesCbc256_HmacSha512"
"#;
        let config = NotecryptConfig::from_toml_str(toml_str).unwrap();
        let kdf = config.kdf_config();
        assert!(matches!(kdf, Err(NotecryptError::Crypto(_))));

        let zero = NotecryptConfig::from_toml_str("[kdf]\niterations = 0\n");
        assert!(zero.unwrap().kdf_config().is_err());
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = NotecryptConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let parsed = NotecryptConfig::from_toml_str(&toml_str).unwrap();

        assert_eq!(config, parsed);
    }
}
