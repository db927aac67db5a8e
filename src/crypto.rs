//! SHA-1 and base64 helpers used by the handshake.

use base64::{
    Engine as _,
    engine::general_purpose::{STANDARD as BASE64, STANDARD_NO_PAD},
};
use sha1::{Digest, Sha1};

use crate::error::Result;

/// SHA-1 digest of `data`.
#[must_use]
pub fn sha1_digest(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    let mut digest = [0u8; 20];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

/// Encode bytes as standard-alphabet base64 with `=` padding.
#[must_use]
pub fn base64_encode(data: &[u8]) -> String {
    BASE64.encode(data)
}

/// Decode base64 text.
///
/// ASCII whitespace and `=` are skipped wherever they appear.
///
/// # Errors
///
/// Returns [`Error::Base64`](crate::Error::Base64) on any other character
/// outside the standard alphabet.
pub fn base64_decode(text: &str) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = text
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b'=')
        .collect();
    Ok(STANDARD_NO_PAD.decode(cleaned)?)
}
