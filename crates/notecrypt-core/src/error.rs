use notecrypt_crypto::CryptoError;
use thiserror::Error;

pub type NotecryptResult<T> = Result<T, NotecryptError>;

#[derive(Debug, Error)]
pub enum NotecryptError {
    #[error("config error: {0}")]
    Config(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
