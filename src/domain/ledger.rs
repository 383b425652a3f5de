use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;

use super::{Account, Cents, Transaction};

/// Lifecycle of a single transfer.
///
/// Requested -> Validated -> Applied -> Logged -> Committed
///     |            |           |
///     +-> Rejected +-----------+-> RolledBack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStage {
    Requested,
    Validated,
    /// Debit and credit written, not yet visible to anyone else
    Applied,
    /// Transaction record appended, not yet visible to anyone else
    Logged,
    Committed,
    /// Refused before anything was committed
    Rejected,
    /// Storage failed after mutation started; nothing survived
    RolledBack,
}

impl TransferStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStage::Requested => "requested",
            TransferStage::Validated => "validated",
            TransferStage::Applied => "applied",
            TransferStage::Logged => "logged",
            TransferStage::Committed => "committed",
            TransferStage::Rejected => "rejected",
            TransferStage::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Replay the log on top of the opening balances.
/// Returns username -> expected balance. Accounts referenced by the log but
/// missing from `accounts` show up starting from zero.
pub fn replay_balances(accounts: &[Account], transactions: &[Transaction]) -> BTreeMap<String, Cents> {
    let mut balances: BTreeMap<String, Cents> = accounts
        .iter()
        .map(|a| (a.username.clone(), a.opening_balance))
        .collect();

    for tx in transactions {
        *balances.entry(tx.sender.clone()).or_insert(0) -= tx.amount_cents;
        *balances.entry(tx.receiver.clone()).or_insert(0) += tx.amount_cents;
    }

    balances
}

/// A single problem found by the integrity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum IntegrityIssue {
    /// Stored balances no longer add up to the opening balances
    ConservationViolated { opening_total: Cents, balance_total: Cents },
    NegativeBalance { username: String, balance: Cents },
    /// Stored balance disagrees with the replayed history
    HistoryMismatch { username: String, stored: Cents, replayed: Cents },
    /// Transaction references an account that does not exist
    UnknownAccount { username: String, sequence: i64 },
    NonPositiveAmount { sequence: i64, amount: Cents },
    SequenceGap { expected: i64, found: i64 },
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityIssue::ConservationViolated { opening_total, balance_total } => write!(
                f,
                "balances sum to {} cents but opening balances sum to {} cents",
                balance_total, opening_total
            ),
            IntegrityIssue::NegativeBalance { username, balance } => {
                write!(f, "account {} has negative balance {} cents", username, balance)
            }
            IntegrityIssue::HistoryMismatch { username, stored, replayed } => write!(
                f,
                "account {} stores {} cents but history replays to {} cents",
                username, stored, replayed
            ),
            IntegrityIssue::UnknownAccount { username, sequence } => write!(
                f,
                "transaction #{} references unknown account {}",
                sequence, username
            ),
            IntegrityIssue::NonPositiveAmount { sequence, amount } => {
                write!(f, "transaction #{} has non-positive amount {}", sequence, amount)
            }
            IntegrityIssue::SequenceGap { expected, found } => {
                write!(f, "sequence gap: expected #{}, found #{}", expected, found)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub account_count: usize,
    pub transaction_count: usize,
    pub opening_total: Cents,
    pub balance_total: Cents,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn is_conserved(&self) -> bool {
        self.opening_total == self.balance_total
    }
}

/// Cross-check stored balances against the transaction log.
/// `transactions` must be ordered by sequence, oldest first.
pub fn build_integrity_report(accounts: &[Account], transactions: &[Transaction]) -> IntegrityReport {
    let mut issues = Vec::new();

    let opening_total: Cents = accounts.iter().map(|a| a.opening_balance).sum();
    let balance_total: Cents = accounts.iter().map(|a| a.balance).sum();
    if opening_total != balance_total {
        issues.push(IntegrityIssue::ConservationViolated {
            opening_total,
            balance_total,
        });
    }

    let known: HashMap<&str, &Account> =
        accounts.iter().map(|a| (a.username.as_str(), a)).collect();

    let mut expected_sequence = transactions.first().map(|t| t.sequence);
    for tx in transactions {
        if let Some(expected) = expected_sequence {
            if tx.sequence != expected {
                issues.push(IntegrityIssue::SequenceGap {
                    expected,
                    found: tx.sequence,
                });
            }
        }
        expected_sequence = Some(tx.sequence + 1);

        if tx.amount_cents <= 0 {
            issues.push(IntegrityIssue::NonPositiveAmount {
                sequence: tx.sequence,
                amount: tx.amount_cents,
            });
        }
        for username in [&tx.sender, &tx.receiver] {
            if !known.contains_key(username.as_str()) {
                issues.push(IntegrityIssue::UnknownAccount {
                    username: username.clone(),
                    sequence: tx.sequence,
                });
            }
        }
    }

    let replayed = replay_balances(accounts, transactions);
    for account in accounts {
        if account.balance < 0 {
            issues.push(IntegrityIssue::NegativeBalance {
                username: account.username.clone(),
                balance: account.balance,
            });
        }
        let expected = replayed.get(&account.username).copied().unwrap_or(0);
        if expected != account.balance {
            issues.push(IntegrityIssue::HistoryMismatch {
                username: account.username.clone(),
                stored: account.balance,
                replayed: expected,
            });
        }
    }

    IntegrityReport {
        account_count: accounts.len(),
        transaction_count: transactions.len(),
        opening_total,
        balance_total,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(username: &str, opening: Cents, balance: Cents) -> Account {
        let mut account = Account::new(username, opening);
        account.balance = balance;
        account
    }

    fn committed(sequence: i64, sender: &str, receiver: &str, amount: Cents) -> Transaction {
        let mut tx = Transaction::new(sender, receiver, amount);
        tx.sequence = sequence;
        tx
    }

    #[test]
    fn test_replay_balances() {
        let accounts = vec![account("alice", 10000, 0), account("bob", 10000, 0)];
        let transactions = vec![
            committed(1, "alice", "bob", 3000),
            committed(2, "bob", "alice", 500),
            committed(3, "alice", "alice", 100),
        ];

        let balances = replay_balances(&accounts, &transactions);

        assert_eq!(balances.get("alice"), Some(&7500));
        assert_eq!(balances.get("bob"), Some(&12500));
    }

    #[test]
    fn test_healthy_ledger() {
        let accounts = vec![account("alice", 10000, 7000), account("bob", 10000, 13000)];
        let transactions = vec![committed(1, "alice", "bob", 3000)];

        let report = build_integrity_report(&accounts, &transactions);

        assert!(report.is_healthy(), "unexpected issues: {:?}", report.issues);
        assert!(report.is_conserved());
        assert_eq!(report.account_count, 2);
        assert_eq!(report.transaction_count, 1);
        assert_eq!(report.balance_total, 20000);
    }

    #[test]
    fn test_debit_without_credit_is_detected() {
        // alice was debited but bob never credited and nothing was logged
        let accounts = vec![account("alice", 10000, 7000), account("bob", 10000, 10000)];

        let report = build_integrity_report(&accounts, &[]);

        assert!(!report.is_conserved());
        assert!(report.issues.contains(&IntegrityIssue::ConservationViolated {
            opening_total: 20000,
            balance_total: 17000,
        }));
        assert!(report.issues.contains(&IntegrityIssue::HistoryMismatch {
            username: "alice".into(),
            stored: 7000,
            replayed: 10000,
        }));
    }

    #[test]
    fn test_logged_but_not_applied_is_detected() {
        let accounts = vec![account("alice", 10000, 10000), account("bob", 10000, 10000)];
        let transactions = vec![committed(1, "alice", "bob", 3000)];

        let report = build_integrity_report(&accounts, &transactions);

        // Totals still match, only the replay catches it
        assert!(report.is_conserved());
        assert_eq!(report.issues.len(), 2);
    }

    #[test]
    fn test_sequence_gaps_and_unknown_accounts() {
        let accounts = vec![account("alice", 10000, 9000), account("bob", 0, 500)];
        let transactions = vec![
            committed(1, "alice", "bob", 500),
            committed(3, "alice", "mallory", 500),
        ];

        let report = build_integrity_report(&accounts, &transactions);

        assert!(report
            .issues
            .contains(&IntegrityIssue::SequenceGap { expected: 2, found: 3 }));
        assert!(report.issues.contains(&IntegrityIssue::UnknownAccount {
            username: "mallory".into(),
            sequence: 3,
        }));
    }

    #[test]
    fn test_negative_balance_is_detected() {
        let accounts = vec![account("alice", 0, -100), account("bob", 0, 100)];
        let transactions = vec![committed(1, "alice", "bob", 100)];

        let report = build_integrity_report(&accounts, &transactions);

        assert_eq!(
            report.issues,
            vec![IntegrityIssue::NegativeBalance {
                username: "alice".into(),
                balance: -100,
            }]
        );
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(TransferStage::Requested.to_string(), "requested");
        assert_eq!(TransferStage::RolledBack.to_string(), "rolled_back");
    }
}
