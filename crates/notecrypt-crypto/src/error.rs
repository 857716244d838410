use thiserror::Error;

use crate::scheme::EncryptionScheme;

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Failures surfaced by the envelope engine.
///
/// `Mismatch`, `Integrity` and `Backend` are distinct here so callers can
/// log them, but anything user-facing should go through
/// [`CryptoError::public_message`] so tampering, wrong keys and corrupt data
/// are indistinguishable from the outside.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Unsupported or reserved scheme, or key material of the wrong size.
    #[error("config error: {0}")]
    Config(String),

    /// Structurally invalid envelope.
    #[error("format error: {0}")]
    Format(String),

    #[error("scheme mismatch: envelope is {envelope}, key is {key}")]
    Mismatch {
        envelope: EncryptionScheme,
        key: EncryptionScheme,
    },

    #[error("integrity error: MAC verification failed")]
    Integrity,

    /// The underlying primitive rejected its input (e.g. bad padding).
    #[error("crypto backend error: {0}")]
    Backend(String),
}

impl CryptoError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub(crate) fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// True for every error `decrypt` can raise after the envelope parsed.
    pub fn is_decryption_failure(&self) -> bool {
        matches!(
            self,
            Self::Mismatch { .. } | Self::Integrity | Self::Backend(_)
        )
    }

    /// Message safe to show an end user.
    pub fn public_message(&self) -> String {
        if self.is_decryption_failure() {
            "decryption failed".to_string()
        } else {
            self.to_string()
        }
    }
}
