//! notecrypt-crypto: zero-knowledge envelope engine for notecrypt
//!
//! Architecture: Encrypt-then-MAC with AES-CBC + HMAC-SHA2
//!
//! Key hierarchy:
//! ```text
//! Password
//!   └── Raw master key (PBKDF2-SHA256/512, per-account salt + iterations)
//!       ├── Stretched master key (HKDF-Expand "enc" || "mac", session only)
//!       │   └── wraps Content key (random, per account)
//!       │       └── Envelopes: AES-CBC(enc_key, random IV) + HMAC(mac_key, IV || ciphertext)
//!       └── Password verifier (PBKDF2 one extra round, sent to the server)
//! ```
//!
//! The server sees only the verifier and envelopes, never plaintext or the
//! content key.

pub mod account;
pub mod backend;
pub mod cipher;
pub mod envelope;
pub mod error;
pub mod kdf;
pub mod keys;
pub mod scheme;
pub mod service;
pub mod stretch;

pub use account::AccountKeys;
pub use backend::{
    select as select_backend, BackendKind, CryptoBackend, PortableBackend, RustCryptoBackend,
};
pub use envelope::{Envelope, EnvelopeEncoding};
pub use error::{CryptoError, CryptoResult};
pub use keys::SymmetricCryptoKey;
pub use scheme::{
    EncryptionScheme, HashAlgorithm, KdfConfig, KdfScheme, DEFAULT_ITERATIONS, MIN_SALT_LEN,
};
pub use service::CryptoService;

/// Size of an AES-CBC initialization vector
pub const IV_SIZE: usize = 16;
