use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Cents;

/// Longest accepted username, in characters.
pub const MAX_USERNAME_LEN: usize = 64;

/// An account holds the balance of exactly one user.
/// Accounts are never deleted; the balance changes only through transfers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique user handle
    pub username: String,
    /// Current balance in cents (never negative)
    pub balance: Cents,
    /// Balance the account was opened with
    pub opening_balance: Cents,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(username: impl Into<String>, opening_balance: Cents) -> Self {
        Self {
            username: username.into(),
            balance: opening_balance,
            opening_balance,
            created_at: Utc::now(),
        }
    }

    /// Net amount moved by transfers since the account was opened.
    pub fn net_flow(&self) -> Cents {
        self.balance - self.opening_balance
    }
}

/// Check that a username is usable as an account handle.
/// Returns a human-readable reason on failure.
pub fn validate_username(username: &str) -> Result<(), String> {
    if username.is_empty() {
        return Err("username must not be empty".to_string());
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(format!(
            "username must be at most {} characters",
            MAX_USERNAME_LEN
        ));
    }
    if username
        .chars()
        .any(|c| c.is_whitespace() || c.is_control())
    {
        return Err("username must not contain whitespace".to_string());
    }
    Ok(())
}
