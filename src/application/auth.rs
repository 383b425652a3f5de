use std::fmt;
use std::sync::OnceLock;

use anyhow::Context;
use chrono::{Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use crate::domain::{
    check_password_strength, hash_password, validate_username, verify_password, Cents,
};
use crate::storage::credentials::{self, ResetTokenRecord, UserRecord};
use crate::storage::Repository;

use super::{AuthError, Ledger, LedgerError};

/// A username whose credentials have been verified.
/// Only the gateway can create one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    username: String,
}

impl Identity {
    fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.username)
    }
}

/// One-time password reset secret, shown to the user exactly once.
pub struct ResetToken(String);

impl ResetToken {
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ResetToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResetToken(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Balance every newly registered account starts with
    pub starting_balance: Cents,
    pub reset_token_ttl: Duration,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            starting_balance: 10000,
            reset_token_ttl: Duration::minutes(30),
        }
    }
}

/// Registration, login and password reset.
#[derive(Clone)]
pub struct AuthGateway {
    repo: Repository,
    settings: AuthSettings,
}

impl AuthGateway {
    pub fn new(repo: Repository, settings: AuthSettings) -> Self {
        Self { repo, settings }
    }

    /// Build a gateway that shares the ledger's database.
    pub fn for_ledger(ledger: &Ledger, settings: AuthSettings) -> Self {
        Self::new(ledger.repository().clone(), settings)
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    /// Register a user and open their account with the starting balance.
    /// Credentials and account are stored in one transaction.
    #[instrument(skip(self, password))]
    pub async fn register(&self, username: &str, password: &str) -> Result<Identity, AuthError> {
        validate_username(username).map_err(LedgerError::InvalidUsername)?;
        let broken = check_password_strength(password);
        if !broken.is_empty() {
            return Err(AuthError::WeakPassword(broken));
        }

        let password_hash = hash_off_thread(password).await?;
        let now = Utc::now();
        let user = UserRecord {
            username: username.to_string(),
            password_hash,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.repo.begin().await?;
        if !credentials::insert_user(&mut tx, &user).await? {
            return Err(AuthError::UserAlreadyExists(username.to_string()));
        }
        Ledger::open_account(&mut tx, username, self.settings.starting_balance).await?;
        tx.commit().await.context("Failed to commit registration")?;

        info!(username, "user registered");
        Ok(Identity::new(username))
    }

    /// Verify a username and password.
    /// Unknown users and wrong passwords produce the same error.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<Identity, AuthError> {
        let user = {
            let mut conn = self.repo.acquire().await?;
            credentials::get_user(&mut conn, username).await?
        };

        // Unknown users still pay for one Argon2 verification.
        let password = password.to_owned();
        let stored_hash = user.map(|user| user.password_hash);
        let valid = tokio::task::spawn_blocking(move || match stored_hash {
            Some(hash) => verify_password(&password, &hash),
            None => {
                let _ = verify_password(&password, dummy_password_hash());
                Ok(false)
            }
        })
        .await
        .context("Password verification task failed")??;

        if !valid {
            info!(username, "login failed");
            return Err(AuthError::InvalidCredentials);
        }
        info!(username, "login succeeded");
        Ok(Identity::new(username))
    }

    /// Issue a password reset token. Any older unused token stops working.
    /// Only the SHA-256 digest of the token is stored.
    #[instrument(skip(self))]
    pub async fn issue_reset_token(&self, username: &str) -> Result<ResetToken, AuthError> {
        let secret: [u8; 32] = rand::thread_rng().r#gen();
        let token = hex::encode(secret);
        let now = Utc::now();
        let record = ResetTokenRecord {
            token_hash: digest_token(&token),
            username: username.to_string(),
            created_at: now,
            expires_at: now + self.settings.reset_token_ttl,
            used_at: None,
        };

        let mut tx = self.repo.begin().await?;
        credentials::invalidate_reset_tokens(&mut tx, username, now).await?;
        if credentials::get_user(&mut tx, username).await?.is_none() {
            return Err(AuthError::UnknownUser(username.to_string()));
        }
        credentials::insert_reset_token(&mut tx, &record).await?;
        tx.commit().await.context("Failed to commit reset token")?;

        info!(username, expires_at = %record.expires_at, "reset token issued");
        Ok(ResetToken(token))
    }

    /// Set a new password using a reset token. The token is single use.
    #[instrument(skip(self, token, new_password))]
    pub async fn reset_password(
        &self,
        username: &str,
        token: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let broken = check_password_strength(new_password);
        if !broken.is_empty() {
            return Err(AuthError::WeakPassword(broken));
        }
        let password_hash = hash_off_thread(new_password).await?;
        let now = Utc::now();

        let mut tx = self.repo.begin().await?;
        if !credentials::consume_reset_token(&mut tx, &digest_token(token), username, now).await? {
            return Err(AuthError::InvalidResetToken);
        }
        if !credentials::update_password(&mut tx, username, &password_hash, now).await? {
            return Err(AuthError::UnknownUser(username.to_string()));
        }
        tx.commit().await.context("Failed to commit password reset")?;

        info!(username, "password reset");
        Ok(())
    }
}

/// Hash that no password matches, used to verify against when the user is unknown.
fn dummy_password_hash() -> &'static str {
    static DUMMY_HASH: OnceLock<String> = OnceLock::new();
    DUMMY_HASH.get_or_init(|| {
        let secret: [u8; 32] = rand::thread_rng().r#gen();
        hash_password(&hex::encode(secret)).unwrap_or_default()
    })
}

fn digest_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.trim().as_bytes()))
}

/// Argon2 blocks for tens of milliseconds, so it runs on the blocking pool.
async fn hash_off_thread(password: &str) -> anyhow::Result<String> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .context("Password hashing task failed")?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_token_is_stable_and_hex() {
        let a = digest_token("abc");
        assert_eq!(a, digest_token("abc"));
        assert_eq!(a, digest_token("  abc\n"));
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, digest_token("abd"));
    }

    #[test]
    fn test_dummy_hash_is_argon2_and_rejects_passwords() {
        let hash = dummy_password_hash();
        assert!(hash.starts_with("$argon2id$"));
        assert_eq!(hash, dummy_password_hash());
        assert!(!verify_password("Alic3!secret", hash).unwrap());
    }

    #[test]
    fn test_reset_token_debug_is_redacted() {
        let token = ResetToken("s3cret".into());
        assert_eq!(format!("{:?}", token), "ResetToken(<redacted>)");
        assert_eq!(token.secret(), "s3cret");
    }
}
