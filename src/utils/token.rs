use anyhow::Context;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use sha2::{Digest, Sha256};

/// 256-bit random token, URL-safe base64 without padding.
pub fn generate_token() -> anyhow::Result<String> {
    let mut bytes = [0u8; 32];
    getrandom::getrandom(&mut bytes).context("Failed to read OS randomness")?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Only digests are persisted; raw tokens live in the cookie or the email.
pub fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}
