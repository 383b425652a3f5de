use std::fmt;

use anyhow::{anyhow, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::rngs::OsRng;
use serde::Serialize;

pub const MIN_PASSWORD_LEN: usize = 8;

/// Characters that count as "special" for the strength rules.
pub const SPECIAL_CHARACTERS: &str = "!@#$%^&*(),.?\":{}|<>";

/// A password strength rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PasswordRule {
    MinLength,
    Uppercase,
    Lowercase,
    Digit,
    Special,
}

impl fmt::Display for PasswordRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PasswordRule::MinLength => write!(f, "at least {} characters", MIN_PASSWORD_LEN),
            PasswordRule::Uppercase => write!(f, "an uppercase letter"),
            PasswordRule::Lowercase => write!(f, "a lowercase letter"),
            PasswordRule::Digit => write!(f, "a digit"),
            PasswordRule::Special => write!(f, "one of {}", SPECIAL_CHARACTERS),
        }
    }
}

/// Returns every rule the password breaks; empty means the password is strong enough.
pub fn check_password_strength(password: &str) -> Vec<PasswordRule> {
    let mut broken = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LEN {
        broken.push(PasswordRule::MinLength);
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        broken.push(PasswordRule::Uppercase);
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        broken.push(PasswordRule::Lowercase);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        broken.push(PasswordRule::Digit);
    }
    if !password.chars().any(|c| SPECIAL_CHARACTERS.contains(c)) {
        broken.push(PasswordRule::Special);
    }
    broken
}

/// Hash a password with Argon2id and a fresh random salt (PHC string format).
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored PHC hash.
/// A malformed stored hash is an error, a mismatch is `Ok(false)`.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| anyhow!("Invalid stored password hash: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strong_password() {
        assert!(check_password_strength("Str0ng!pass").is_empty());
    }

    #[test]
    fn test_weak_passwords() {
        assert_eq!(
            check_password_strength("Sh0rt!"),
            vec![PasswordRule::MinLength]
        );
        assert_eq!(
            check_password_strength("alllowercase1!"),
            vec![PasswordRule::Uppercase]
        );
        assert_eq!(
            check_password_strength("NoDigitsHere!"),
            vec![PasswordRule::Digit]
        );
        assert_eq!(
            check_password_strength("NoSpecial123"),
            vec![PasswordRule::Special]
        );
        assert_eq!(check_password_strength("").len(), 5);
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("Str0ng!pass").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("Str0ng!pass", &hash).unwrap());
        assert!(!verify_password("Wr0ng!pass", &hash).unwrap());
    }

    #[test]
    fn test_same_password_gets_different_salts() {
        let a = hash_password("Str0ng!pass").unwrap();
        let b = hash_password("Str0ng!pass").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        assert!(verify_password("anything", "not-a-phc-string").is_err());
    }
}
