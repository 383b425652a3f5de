use thiserror::Error;

use crate::domain::{format_cents, Cents, PasswordRule};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account already exists: {0}")]
    DuplicateAccount(String),

    #[error(
        "Insufficient funds in account {account}: balance {}, required {}",
        format_cents(*balance),
        format_cents(*required)
    )]
    InsufficientFunds {
        account: String,
        balance: Cents,
        required: Cents,
    },

    /// The backend failed; the operation was rolled back in full.
    #[error("Storage failure: {0:#}")]
    StorageFailure(#[from] anyhow::Error),
}

impl LedgerError {
    /// Only storage failures may succeed on retry; everything else needs new input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::StorageFailure(_))
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("User already exists: {0}")]
    UserAlreadyExists(String),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Password must contain {}", describe_rules(.0))]
    WeakPassword(Vec<PasswordRule>),

    #[error("Invalid or expired reset token")]
    InvalidResetToken,

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Storage or password hashing failed; nothing was changed.
    #[error("Authentication backend failure: {0:#}")]
    Backend(#[from] anyhow::Error),
}

fn describe_rules(rules: &[PasswordRule]) -> String {
    rules
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = LedgerError::InsufficientFunds {
            account: "alice".into(),
            balance: 7000,
            required: 100000,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient funds in account alice: balance 70.00, required 1000.00"
        );
        assert_eq!(
            LedgerError::AccountNotFound("bob".into()).to_string(),
            "Account not found: bob"
        );
        assert_eq!(
            AuthError::WeakPassword(vec![PasswordRule::Uppercase, PasswordRule::Digit])
                .to_string(),
            "Password must contain an uppercase letter, a digit"
        );
    }

    #[test]
    fn test_only_storage_failures_are_retryable() {
        assert!(LedgerError::StorageFailure(anyhow::anyhow!("disk I/O error")).is_retryable());
        assert!(!LedgerError::InvalidAmount("zero".into()).is_retryable());
        assert!(!LedgerError::InsufficientFunds {
            account: "alice".into(),
            balance: 0,
            required: 1,
        }
        .is_retryable());
    }
}
