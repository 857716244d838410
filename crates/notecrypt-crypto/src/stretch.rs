//! Key stretching: raw KDF output → independent encryption and MAC subkeys.

use zeroize::Zeroizing;

use crate::backend::CryptoBackend;
use crate::error::CryptoResult;
use crate::scheme::EncryptionScheme;

/// Stretch a raw key into the full key for `scheme`.
///
/// `AesCbc256` passes the key through and requires exactly 32 bytes. The
/// HMAC schemes return `HKDF-Expand(raw, "enc") || HKDF-Expand(raw, "mac")`
/// sized by the scheme table.
pub fn stretch_key(
    backend: &dyn CryptoBackend,
    raw: &[u8],
    scheme: EncryptionScheme,
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    scheme.check_stretch_input(raw.len())?;

    let Some(hash) = scheme.mac_algorithm() else {
        return Ok(Zeroizing::new(raw.to_vec()));
    };

    let (enc_len, mac_len) = (scheme.enc_key_len(), scheme.mac_len());
    let enc = backend.hkdf_expand(raw, b"enc", enc_len, hash)?;
    let mac = backend.hkdf_expand(raw, b"mac", mac_len, hash)?;

    let mut stretched = Zeroizing::new(Vec::with_capacity(scheme.total_key_len()));
    stretched.extend_from_slice(&enc);
    stretched.extend_from_slice(&mac);
    Ok(stretched)
}
