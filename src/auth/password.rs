use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use regex::Regex;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::error;

pub const MIN_PASSWORD_LEN: usize = 8;

/// First password rule a candidate fails, in check order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("Password must be at least 8 characters long")]
    TooShort,
    #[error("Password must include at least one uppercase letter")]
    MissingUppercase,
    #[error("Password must include at least one lowercase letter")]
    MissingLowercase,
    #[error("Password must include at least one number")]
    MissingDigit,
    #[error("Password must include at least one special character")]
    MissingSpecial,
}

lazy_static! {
    static ref UPPER_RE: Regex = Regex::new(r"[A-Z]").unwrap();
    static ref LOWER_RE: Regex = Regex::new(r"[a-z]").unwrap();
    static ref DIGIT_RE: Regex = Regex::new(r"[0-9]").unwrap();
    static ref SPECIAL_RE: Regex = Regex::new(r#"[!@#$%^&*(),.?":{}|<>]"#).unwrap();
}

pub fn validate_password(password: &str) -> Result<(), PolicyViolation> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(PolicyViolation::TooShort);
    }
    if !UPPER_RE.is_match(password) {
        return Err(PolicyViolation::MissingUppercase);
    }
    if !LOWER_RE.is_match(password) {
        return Err(PolicyViolation::MissingLowercase);
    }
    if !DIGIT_RE.is_match(password) {
        return Err(PolicyViolation::MissingDigit);
    }
    if !SPECIAL_RE.is_match(password) {
        return Err(PolicyViolation::MissingSpecial);
    }
    Ok(())
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// `hash_password` on the blocking pool.
pub async fn hash_password_blocking(plain: String) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&plain)).await?
}

/// `verify_password` on the blocking pool.
pub async fn verify_password_blocking(plain: String, hash: String) -> anyhow::Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&plain, &hash)).await?
}

lazy_static! {
    static ref DUMMY_HASH: OnceCell<String> = OnceCell::new();
}

/// A hash with the default parameters, computed once. Verifying against it
/// costs the same as verifying a stored hash.
pub async fn dummy_hash() -> anyhow::Result<&'static str> {
    let hash = DUMMY_HASH
        .get_or_try_init(|| hash_password_blocking("no account matched".to_string()))
        .await?;
    Ok(hash.as_str())
}
