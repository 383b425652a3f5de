use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Cents;

pub type TransactionId = Uuid;

/// A committed movement of money from one account to another.
/// Transactions are immutable and append-only; there is no way to edit or delete one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Monotonically increasing sequence number, assigned at commit
    pub sequence: i64,
    /// Account that was debited
    pub sender: String,
    /// Account that was credited
    pub receiver: String,
    /// Amount in cents (always positive)
    pub amount_cents: Cents,
    /// Commit time, assigned by the transaction log
    pub timestamp: DateTime<Utc>,
}

/// How a transaction looks from the point of view of one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
    /// Sender and receiver are the same account
    SelfTransfer,
}

impl Transaction {
    /// Create a pending transaction. Sequence and timestamp are assigned by the log.
    pub fn new(sender: impl Into<String>, receiver: impl Into<String>, amount_cents: Cents) -> Self {
        assert!(amount_cents > 0, "Transaction amount must be positive");
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            sender: sender.into(),
            receiver: receiver.into(),
            amount_cents,
            timestamp: Utc::now(),
        }
    }

    pub fn is_self_transfer(&self) -> bool {
        self.sender == self.receiver
    }

    /// Direction relative to `username`, or None if the account is not involved.
    pub fn direction_for(&self, username: &str) -> Option<Direction> {
        match (self.sender == username, self.receiver == username) {
            (true, true) => Some(Direction::SelfTransfer),
            (true, false) => Some(Direction::Outgoing),
            (false, true) => Some(Direction::Incoming),
            (false, false) => None,
        }
    }

    /// Signed effect of this transaction on the balance of `username`.
    pub fn balance_effect(&self, username: &str) -> Cents {
        match self.direction_for(username) {
            Some(Direction::Incoming) => self.amount_cents,
            Some(Direction::Outgoing) => -self.amount_cents,
            Some(Direction::SelfTransfer) | None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_transaction() {
        let tx = Transaction::new("alice", "bob", 3000);

        assert_eq!(tx.sender, "alice");
        assert_eq!(tx.receiver, "bob");
        assert_eq!(tx.amount_cents, 3000);
        assert_eq!(tx.sequence, 0);
        assert!(!tx.is_self_transfer());
    }

    #[test]
    fn test_direction_and_effect() {
        let tx = Transaction::new("alice", "bob", 3000);

        assert_eq!(tx.direction_for("alice"), Some(Direction::Outgoing));
        assert_eq!(tx.direction_for("bob"), Some(Direction::Incoming));
        assert_eq!(tx.direction_for("carol"), None);
        assert_eq!(tx.balance_effect("alice"), -3000);
        assert_eq!(tx.balance_effect("bob"), 3000);
        assert_eq!(tx.balance_effect("carol"), 0);
    }

    #[test]
    fn test_self_transfer_has_no_effect() {
        let tx = Transaction::new("alice", "alice", 500);

        assert!(tx.is_self_transfer());
        assert_eq!(tx.direction_for("alice"), Some(Direction::SelfTransfer));
        assert_eq!(tx.balance_effect("alice"), 0);
    }

    #[test]
    #[should_panic(expected = "Transaction amount must be positive")]
    fn test_transaction_requires_positive_amount() {
        Transaction::new("alice", "bob", 0);
    }
}
