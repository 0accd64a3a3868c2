use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::validator::Validator;

/// What a token authorizes. Tokens of different scopes for the same user are
/// independent: bulk deletion is always scope-scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Activation,
    Authentication,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Activation => "activation",
            Scope::Authentication => "authentication",
        }
    }
}

/// An issued access token. Only `hash` is ever persisted; the plaintext
/// exists in the issuance response and the client's bearer credential.
#[derive(Debug, Clone, Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip_serializing)]
    pub hash: String,
    #[serde(skip_serializing)]
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub scope: Scope,
}

impl Token {
    /// Generate a token from 16 bytes of OS entropy, base64url-encoded with
    /// no padding (22 characters on the wire).
    pub fn new(user_id: i64, ttl: Duration, scope: Scope) -> anyhow::Result<Token> {
        let mut raw = [0u8; 16];
        rand::rngs::OsRng
            .try_fill_bytes(&mut raw)
            .map_err(|e| anyhow::anyhow!("entropy source failure: {}", e))?;

        let plaintext = URL_SAFE_NO_PAD.encode(raw);
        let hash = hash_plaintext(&plaintext);

        Ok(Token {
            plaintext,
            hash,
            user_id,
            expiry: Utc::now() + ttl,
            scope,
        })
    }
}

/// SHA-256 digest of a presented plaintext, hex-encoded for storage and
/// lookup.
pub fn hash_plaintext(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

pub fn validate_token_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(plaintext.len() == 22, "token", "must be 22 bytes long");
}

// ── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_token_shape() {
        let t = Token::new(7, Duration::hours(24), Scope::Authentication).unwrap();
        assert_eq!(t.plaintext.len(), 22);
        assert_eq!(t.user_id, 7);
        assert_eq!(t.scope, Scope::Authentication);
        assert!(t.expiry > Utc::now());
        assert_eq!(t.hash, hash_plaintext(&t.plaintext));
    }

    #[test]
    fn tokens_are_unique() {
        let a = Token::new(1, Duration::hours(1), Scope::Activation).unwrap();
        let b = Token::new(1, Duration::hours(1), Scope::Activation).unwrap();
        assert_ne!(a.plaintext, b.plaintext);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn hash_is_deterministic_and_hex() {
        let h = hash_plaintext("ABCDEFGHIJKLMNOPQRSTUV");
        assert_eq!(h, hash_plaintext("ABCDEFGHIJKLMNOPQRSTUV"));
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn plaintext_validation_rejects_wrong_length() {
        let mut v = Validator::new();
        validate_token_plaintext(&mut v, "too-short");
        assert!(!v.is_valid());

        let mut v = Validator::new();
        validate_token_plaintext(&mut v, "ABCDEFGHIJKLMNOPQRSTUV");
        assert!(v.is_valid());
    }

    #[test]
    fn serialized_token_exposes_plaintext_not_hash() {
        let t = Token::new(1, Duration::hours(1), Scope::Authentication).unwrap();
        let json = serde_json::to_value(&t).unwrap();
        assert!(json.get("token").is_some());
        assert!(json.get("hash").is_none());
        assert!(json.get("user_id").is_none());
    }
}
