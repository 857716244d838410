//! Envelope codec: the self-describing unit carrying scheme, IV, ciphertext and MAC.
//!
//! Text form (stored in account records and JSON payloads):
//! ```text
//! <scheme id>.<iv b64>|<ciphertext b64>[|<mac b64>]
//! ```
//!
//! Binary form:
//! ```text
//! [1 byte: scheme id][16 bytes: IV][0 | 32 | 64 bytes: MAC][N >= 1 bytes: ciphertext]
//! ```
//!
//! Parsing fails closed: any deviation from the scheme's fixed layout is a
//! [`CryptoError::Format`], never a partial result.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CryptoError, CryptoResult};
use crate::scheme::{EncryptionScheme, RESERVED_SCHEME_IDS};
use crate::IV_SIZE;

const SCHEME_TAG_LEN: usize = 1;
const MIN_CIPHERTEXT_LEN: usize = 1;

/// Which physical form an envelope is written in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeEncoding {
    #[default]
    Text,
    /// Binary form, base64-encoded when it travels as a string.
    Binary,
}

impl FromStr for EnvelopeEncoding {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "binary" => Ok(Self::Binary),
            other => Err(CryptoError::config(format!("unknown encoding: {other}"))),
        }
    }
}

/// Logical envelope record. Both encodings are lossless views of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    scheme: EncryptionScheme,
    iv: [u8; IV_SIZE],
    ciphertext: Vec<u8>,
    mac: Option<Vec<u8>>,
}

impl Envelope {
    /// Build an envelope, checking the MAC against the scheme: present iff the
    /// scheme has a MAC, and exactly the scheme's MAC length.
    pub fn new(
        scheme: EncryptionScheme,
        iv: [u8; IV_SIZE],
        ciphertext: Vec<u8>,
        mac: Option<Vec<u8>>,
    ) -> CryptoResult<Self> {
        if ciphertext.len() < MIN_CIPHERTEXT_LEN {
            return Err(CryptoError::format("malformed envelope: empty ciphertext"));
        }
        match (&mac, scheme.mac_len()) {
            (None, 0) => {}
            (Some(tag), len) if len > 0 && tag.len() == len => {}
            (Some(_), 0) => {
                return Err(CryptoError::format(format!(
                    "malformed envelope: {scheme} carries no MAC"
                )))
            }
            (_, len) => {
                return Err(CryptoError::format(format!(
                    "malformed envelope: {scheme} requires a {len}-byte MAC"
                )))
            }
        }
        Ok(Self {
            scheme,
            iv,
            ciphertext,
            mac,
        })
    }

    pub fn scheme(&self) -> EncryptionScheme {
        self.scheme
    }

    pub fn iv(&self) -> &[u8; IV_SIZE] {
        &self.iv
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn mac(&self) -> Option<&[u8]> {
        self.mac.as_deref()
    }

    // ── Text form ────────────────────────────────────────────────────────────

    pub fn to_text(&self) -> String {
        let mut out = format!(
            "{}.{}|{}",
            self.scheme.id(),
            STANDARD.encode(self.iv),
            STANDARD.encode(&self.ciphertext)
        );
        if let Some(mac) = &self.mac {
            out.push('|');
            out.push_str(&STANDARD.encode(mac));
        }
        out
    }

    pub fn parse_text(text: &str) -> CryptoResult<Self> {
        let (id, body) = text
            .split_once('.')
            .ok_or_else(|| CryptoError::format("malformed envelope: missing scheme separator"))?;
        if !is_canonical_id(id) {
            return Err(CryptoError::format(format!("unknown scheme: {id:?}")));
        }
        let scheme = id
            .parse::<u8>()
            .map_err(|_| CryptoError::format(format!("unknown scheme: {id}")))
            .and_then(scheme_from_id)?;

        let parts: Vec<&str> = body.split('|').collect();
        if parts.len() != scheme.text_part_count() {
            return Err(CryptoError::format(format!(
                "malformed envelope: {scheme} expects {} parts, got {}",
                scheme.text_part_count(),
                parts.len()
            )));
        }

        let iv = decode_part(parts[0], "IV")?;
        let iv: [u8; IV_SIZE] = iv.try_into().map_err(|v: Vec<u8>| {
            CryptoError::format(format!(
                "malformed envelope: IV must be {IV_SIZE} bytes, got {}",
                v.len()
            ))
        })?;
        let ciphertext = decode_part(parts[1], "ciphertext")?;
        let mac = parts.get(2).map(|p| decode_part(p, "MAC")).transpose()?;

        Self::new(scheme, iv, ciphertext, mac)
    }

    // ── Binary form ──────────────────────────────────────────────────────────

    pub fn to_bytes(&self) -> Vec<u8> {
        let mac = self.mac.as_deref().unwrap_or_default();
        let len = SCHEME_TAG_LEN + IV_SIZE + mac.len() + self.ciphertext.len();
        let mut out = Vec::with_capacity(len);
        out.push(self.scheme.id());
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(mac);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        let (&id, rest) = bytes
            .split_first()
            .ok_or_else(|| CryptoError::format("malformed envelope: empty buffer"))?;
        let scheme = scheme_from_id(id)?;

        let mac_len = scheme.mac_len();
        let min_len = SCHEME_TAG_LEN + IV_SIZE + mac_len + MIN_CIPHERTEXT_LEN;
        if bytes.len() < min_len {
            return Err(CryptoError::format(format!(
                "malformed envelope: {} bytes is below the {min_len}-byte minimum for {scheme}",
                bytes.len()
            )));
        }

        let (iv, rest) = rest.split_at(IV_SIZE);
        let (mac, ciphertext) = rest.split_at(mac_len);
        let mut iv_bytes = [0u8; IV_SIZE];
        iv_bytes.copy_from_slice(iv);
        let mac = (mac_len > 0).then(|| mac.to_vec());

        Self::new(scheme, iv_bytes, ciphertext.to_vec(), mac)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    /// Parse the base64 transport of the binary form.
    pub fn from_base64(b64: &str) -> CryptoResult<Self> {
        let bytes = STANDARD
            .decode(b64.trim())
            .map_err(|e| CryptoError::format(format!("malformed envelope: invalid base64: {e}")))?;
        Self::from_bytes(&bytes)
    }

    // ── Either form, as a string ─────────────────────────────────────────────

    pub fn encode_as(&self, encoding: EnvelopeEncoding) -> String {
        match encoding {
            EnvelopeEncoding::Text => self.to_text(),
            EnvelopeEncoding::Binary => self.to_base64(),
        }
    }

    pub fn decode_as(s: &str, encoding: EnvelopeEncoding) -> CryptoResult<Self> {
        match encoding {
            EnvelopeEncoding::Text => Self::parse_text(s.trim()),
            EnvelopeEncoding::Binary => Self::from_base64(s),
        }
    }

    /// Tell the encodings apart by the text form's `.` separator, which never
    /// occurs in base64.
    pub fn detect_encoding(s: &str) -> EnvelopeEncoding {
        if s.contains('.') {
            EnvelopeEncoding::Text
        } else {
            EnvelopeEncoding::Binary
        }
    }

    pub fn decode_any(s: &str) -> CryptoResult<Self> {
        Self::decode_as(s, Self::detect_encoding(s))
    }
}

fn scheme_from_id(id: u8) -> CryptoResult<EncryptionScheme> {
    EncryptionScheme::from_id(id).ok_or_else(|| {
        if RESERVED_SCHEME_IDS.contains(&id) {
            CryptoError::format(format!("unknown scheme: {id} (reserved, unsupported)"))
        } else {
            CryptoError::format(format!("unknown scheme: {id}"))
        }
    })
}

fn decode_part(part: &str, field: &str) -> CryptoResult<Vec<u8>> {
    STANDARD
        .decode(part)
        .map_err(|e| CryptoError::format(format!("malformed envelope: bad {field} base64: {e}")))
}

/// Decimal digits with no sign and no leading zeros, so every scheme has
/// exactly one text id.
fn is_canonical_id(id: &str) -> bool {
    let digits = !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit());
    digits && (id == "0" || !id.starts_with('0'))
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl FromStr for Envelope {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_text(s)
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_text())
    }
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse_text(&text).map_err(serde::de::Error::custom)
    }
}
