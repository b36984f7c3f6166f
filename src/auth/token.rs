//! Remember-me token generation and hashing.
//!
//! Tokens are drawn from the operating system random source. Only the
//! SHA-256 hash is stored server-side.

use rand::TryRngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::Error;

/// Number of characters in a raw token.
pub const TOKEN_LENGTH: usize = 32;

/// Token alphabet. 64 symbols, so each symbol is taken from the low 6 bits of
/// a random byte without bias. Safe in headers and JSON without escaping.
const TOKEN_CHARS: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Generate a new token. Returns `(raw, hash)`.
///
/// Fails with `RandomnessUnavailable` when the OS source cannot be read.
pub fn generate_token() -> Result<(String, String), Error> {
    let mut bytes = [0u8; TOKEN_LENGTH];
    OsRng.try_fill_bytes(&mut bytes)?;

    let raw: String = bytes
        .iter()
        .map(|b| TOKEN_CHARS[(b & 0x3f) as usize] as char)
        .collect();
    let hash = hash_token(&raw);
    Ok((raw, hash))
}

/// SHA-256 of a raw token, lowercase hex.
pub fn hash_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}
