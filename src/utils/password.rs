use anyhow::{Context, Result};
use std::borrow::Cow;
use validator::ValidationError;

pub const PASSWORD_RULE_MESSAGE: &str =
    "Mật khẩu phải có ít nhất 8 ký tự, gồm chữ hoa, chữ thường và chữ số";

/// Work factor from `BCRYPT_COST`, bcrypt's default otherwise.
fn cost() -> u32 {
    crate::config::parse_env("BCRYPT_COST", bcrypt::DEFAULT_COST).clamp(4, 31)
}

pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, cost()).context("Failed to hash password")
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    bcrypt::verify(password, hash).context("Failed to verify password")
}

pub fn is_strong_password(password: &str) -> bool {
    password.chars().count() >= 8
        && password.chars().any(|c| c.is_uppercase())
        && password.chars().any(|c| c.is_lowercase())
        && password.chars().any(|c| c.is_ascii_digit())
}

/// `validator` hook for password fields.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if is_strong_password(password) {
        Ok(())
    } else {
        Err(ValidationError::new("password_complexity")
            .with_message(Cow::Borrowed(PASSWORD_RULE_MESSAGE)))
    }
}
