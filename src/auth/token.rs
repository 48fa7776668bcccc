//! Bearer token minting and verification.
//!
//! Tokens are opaque strings of the form `labtrack_<lookup>_<secret>`.
//! Only the lookup half is stored in clear; the full token is argon2id
//! hashed, so a leaked database cannot be replayed against the API.

use std::fmt::Write;

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::RngCore;

use crate::error::{Error, Result};

const TOKEN_PREFIX: &str = "labtrack";
const LOOKUP_BYTES: usize = 4;
const SECRET_BYTES: usize = 12;
const LOOKUP_LENGTH: usize = LOOKUP_BYTES * 2;
const SECRET_LENGTH: usize = SECRET_BYTES * 2;

pub struct TokenGenerator {
    argon2: Argon2<'static>,
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenGenerator {
    #[must_use]
    pub fn new() -> Self {
        // 64MB memory, 1 iteration, 4 lanes, 32-byte output
        let params =
            Params::new(64 * 1024, 1, 4, Some(32)).expect("invalid argon2 params");

        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }

    /// Mints a fresh token. Returns the raw token (shown to the caller
    /// exactly once), the lookup key, and the hash to persist.
    pub fn generate(&self) -> Result<(String, String, String)> {
        let lookup = random_hex(LOOKUP_BYTES);
        let raw_token = format!("{TOKEN_PREFIX}_{lookup}_{}", random_hex(SECRET_BYTES));
        let hash = self.hash(&raw_token)?;
        Ok((raw_token, lookup, hash))
    }

    fn hash(&self, token: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(token.as_bytes(), &salt)
            .map_err(|e| Error::Config(format!("failed to hash token: {e}")))?;
        Ok(hash.to_string())
    }

    /// Checks a presented token against a stored hash. A mismatched
    /// password is `Ok(false)`; anything else wrong with the hash is an
    /// error.
    pub fn verify(&self, token: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| Error::Config(format!("invalid hash format: {e}")))?;

        match self.argon2.verify_password(token.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(Error::Config(format!("failed to verify token: {e}"))),
        }
    }
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().fold(String::with_capacity(len * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// Splits a presented token into its lookup and secret halves, rejecting
/// anything that does not match the minted shape.
pub fn parse_token(token: &str) -> Result<(String, String)> {
    let rest = token
        .strip_prefix(TOKEN_PREFIX)
        .and_then(|r| r.strip_prefix('_'))
        .ok_or(Error::InvalidTokenFormat)?;

    let (lookup, secret) = rest.split_once('_').ok_or(Error::InvalidTokenFormat)?;
    if lookup.len() != LOOKUP_LENGTH
        || secret.len() != SECRET_LENGTH
        || secret.contains('_')
    {
        return Err(Error::InvalidTokenFormat);
    }

    Ok((lookup.to_string(), secret.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_token_parses_back() {
        let generator = TokenGenerator::new();
        let (token, lookup, _hash) = generator.generate().unwrap();

        let (parsed_lookup, parsed_secret) = parse_token(&token).unwrap();
        assert_eq!(parsed_lookup, lookup);
        assert_eq!(parsed_secret.len(), 24);
        assert!(token.starts_with("labtrack_"));
    }

    #[test]
    fn test_verify_accepts_minted_token_only() {
        let generator = TokenGenerator::new();
        let (token, _, hash) = generator.generate().unwrap();

        assert!(generator.verify(&token, &hash).unwrap());

        let tampered = format!("{}beef", &token[..token.len() - 4]);
        assert!(!generator.verify(&tampered, &hash).unwrap());
    }

    #[test]
    fn test_hash_is_phc_argon2id() {
        let generator = TokenGenerator::new();
        let (_, _, hash) = generator.generate().unwrap();
        assert!(hash.starts_with("$argon2id$"));
    }

    #[test]
    fn test_parse_rejects_malformed_tokens() {
        for bad in [
            "labtrack_12345678",
            "other_12345678_123456789012345678901234",
            "labtrack_1234_123456789012345678901234",
            "labtrack_12345678_tooshort",
            "labtrack_12345678_1234567890_2345678901234",
        ] {
            assert!(parse_token(bad).is_err(), "accepted {bad}");
        }

        let (lookup, secret) =
            parse_token("labtrack_12345678_123456789012345678901234").unwrap();
        assert_eq!(lookup, "12345678");
        assert_eq!(secret, "123456789012345678901234");
    }
}
