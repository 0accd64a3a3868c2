use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::validator::Validator;

/// A registered account. Users carry the same optimistic-concurrency
/// `version` stamp as listings; activation flips through a conditional
/// update.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub activated: bool,
    #[serde(skip_serializing)]
    pub version: i32,
}

/// Hash a plaintext password with Argon2id and a fresh random salt.
pub fn hash_password(plaintext: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

/// Verify a plaintext password against a stored Argon2 hash.
pub fn verify_password(plaintext: &str, stored_hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| anyhow::anyhow!("malformed password hash: {}", e))?;
    Ok(Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok())
}

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    // Deliberately loose: full RFC 5322 parsing buys nothing here.
    v.check(
        email.contains('@') && !email.starts_with('@') && !email.ends_with('@'),
        "email",
        "must be a valid email address",
    );
}

pub fn validate_password_plaintext(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(password.len() >= 8, "password", "must be at least 8 bytes long");
    v.check(password.len() <= 72, "password", "must not be more than 72 bytes long");
}

pub fn validate_user(v: &mut Validator, user: &User) {
    v.check(!user.name.is_empty(), "name", "must be provided");
    v.check(user.name.len() <= 500, "name", "must not be more than 500 bytes long");
    validate_email(v, &user.email);
}

// ── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_roundtrip() {
        let hash = hash_password("pa55word-pa55word").unwrap();
        assert!(verify_password("pa55word-pa55word", &hash).unwrap());
        assert!(!verify_password("wrong-password-1", &hash).unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("pa55word-pa55word").unwrap();
        let b = hash_password("pa55word-pa55word").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn email_validation() {
        let mut v = Validator::new();
        validate_email(&mut v, "alice@example.com");
        assert!(v.is_valid());

        for bad in ["", "no-at-sign", "@leading", "trailing@"] {
            let mut v = Validator::new();
            validate_email(&mut v, bad);
            assert!(!v.is_valid(), "{:?} should fail", bad);
        }
    }

    #[test]
    fn password_length_bounds() {
        let mut v = Validator::new();
        validate_password_plaintext(&mut v, "short");
        assert!(!v.is_valid());

        let mut v = Validator::new();
        validate_password_plaintext(&mut v, &"x".repeat(73));
        assert!(!v.is_valid());

        let mut v = Validator::new();
        validate_password_plaintext(&mut v, "long-enough-password");
        assert!(v.is_valid());
    }
}
