//! Random tokens and CSP nonces drawn from the OS CSPRNG.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use rand::{rngs::OsRng, RngCore};

/// Number of random bytes in a CSP nonce (128 bits).
pub const NONCE_BYTES: usize = 16;

/// Generate `byte_len` random bytes encoded as base64url without padding.
///
/// Suitable for session identifiers, CSRF tokens and similar opaque values.
#[must_use]
pub fn generate_token(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a nonce for the CSP `script-src` directive.
///
/// Uses standard base64, which is what the `nonce-source` grammar expects.
#[must_use]
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}
