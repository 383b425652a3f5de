use anyhow::Context;
use sqlx::SqliteConnection;
use tracing::{debug, info, instrument, warn};

use crate::domain::{
    build_integrity_report, parse_cents, validate_username, Account, Cents, IntegrityReport,
    Transaction, TransferStage, MAX_AMOUNT_CENTS,
};
use crate::storage::{accounts, sqlite_url, transaction_log, Repository, StorageOptions};

use super::LedgerError;

/// The ledger: moves money between accounts and answers balance and history queries.
///
/// This is the primary interface for any client (CLI, shell, tests). Callers
/// are expected to have resolved the acting identity through the
/// [`AuthGateway`](super::AuthGateway); the ledger does not re-check credentials.
///
/// `Ledger` is cheap to clone and safe to share between tasks; every clone
/// works on the same connection pool.
#[derive(Clone)]
pub struct Ledger {
    repo: Repository,
}

impl Ledger {
    /// Create a new ledger over the given repository.
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str, options: &StorageOptions) -> Result<Self, LedgerError> {
        let repo = Repository::init(&sqlite_url(database_path), options).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str, options: &StorageOptions) -> Result<Self, LedgerError> {
        let repo = Repository::connect(&sqlite_url(database_path), options, false).await?;
        Ok(Self::new(repo))
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    // ========================
    // Account operations
    // ========================

    /// Open an account with a starting balance. Used once, at registration.
    #[instrument(skip(self))]
    pub async fn create_account(
        &self,
        username: &str,
        starting_balance: Cents,
    ) -> Result<Account, LedgerError> {
        let mut conn = self.repo.acquire().await?;
        Self::open_account(&mut conn, username, starting_balance).await
    }

    /// Insert an account on a caller-provided connection, so registration can
    /// open it in the same transaction that stores the credentials.
    pub(crate) async fn open_account(
        conn: &mut SqliteConnection,
        username: &str,
        starting_balance: Cents,
    ) -> Result<Account, LedgerError> {
        validate_username(username).map_err(LedgerError::InvalidUsername)?;
        if starting_balance < 0 {
            return Err(LedgerError::InvalidAmount(
                "Starting balance must not be negative".to_string(),
            ));
        }
        if starting_balance > MAX_AMOUNT_CENTS {
            return Err(LedgerError::InvalidAmount(
                "Starting balance exceeds the maximum amount".to_string(),
            ));
        }

        let account = Account::new(username, starting_balance);
        if !accounts::insert(conn, &account).await? {
            return Err(LedgerError::DuplicateAccount(username.to_string()));
        }

        info!(username, starting_balance, "account opened");
        Ok(account)
    }

    pub async fn get_account(&self, username: &str) -> Result<Account, LedgerError> {
        let mut conn = self.repo.acquire().await?;
        accounts::get(&mut conn, username)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(username.to_string()))
    }

    /// Current balance of an account.
    pub async fn get_balance(&self, username: &str) -> Result<Cents, LedgerError> {
        let mut conn = self.repo.acquire().await?;
        accounts::balance(&mut conn, username)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(username.to_string()))
    }

    /// List all accounts, ordered by username.
    pub async fn list_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        let mut conn = self.repo.acquire().await?;
        Ok(accounts::list(&mut conn).await?)
    }

    // ========================
    // Transfer operations
    // ========================

    /// Move `amount_cents` from `sender` to `receiver`.
    ///
    /// Debit, credit and the transaction record commit together or not at all.
    /// Sending to yourself is allowed: it needs sufficient funds, leaves the
    /// balance unchanged and is still recorded.
    #[instrument(skip(self))]
    pub async fn transfer(
        &self,
        sender: &str,
        receiver: &str,
        amount_cents: Cents,
    ) -> Result<Transaction, LedgerError> {
        debug!(stage = %TransferStage::Requested);

        match self.execute_transfer(sender, receiver, amount_cents).await {
            Ok(transaction) => {
                info!(
                    stage = %TransferStage::Committed,
                    id = %transaction.id,
                    sequence = transaction.sequence,
                    "transfer committed"
                );
                Ok(transaction)
            }
            Err(err @ LedgerError::StorageFailure(_)) => {
                warn!(stage = %TransferStage::RolledBack, error = %err, "transfer rolled back");
                Err(err)
            }
            Err(err) => {
                info!(stage = %TransferStage::Rejected, reason = %err, "transfer rejected");
                Err(err)
            }
        }
    }

    async fn execute_transfer(
        &self,
        sender: &str,
        receiver: &str,
        amount_cents: Cents,
    ) -> Result<Transaction, LedgerError> {
        validate_amount(amount_cents)?;

        let mut tx = self.repo.begin().await?;

        // The debit is the first statement so the transaction takes SQLite's
        // write lock before reading anything. Existence and funds are checked
        // by the conditional updates themselves; a failed guard changes nothing.
        if !accounts::adjust_balance(&mut tx, sender, -amount_cents).await? {
            let err = match accounts::balance(&mut tx, sender).await? {
                None => LedgerError::AccountNotFound(sender.to_string()),
                Some(balance) => LedgerError::InsufficientFunds {
                    account: sender.to_string(),
                    balance,
                    required: amount_cents,
                },
            };
            tx.rollback().await.context("Failed to roll back transfer")?;
            return Err(err);
        }

        if !accounts::adjust_balance(&mut tx, receiver, amount_cents).await? {
            tx.rollback().await.context("Failed to roll back transfer")?;
            return Err(LedgerError::AccountNotFound(receiver.to_string()));
        }
        debug!(stage = %TransferStage::Validated);
        debug!(stage = %TransferStage::Applied);

        let mut transaction = Transaction::new(sender, receiver, amount_cents);
        transaction_log::append(&mut tx, &mut transaction).await?;
        debug!(stage = %TransferStage::Logged, sequence = transaction.sequence);

        tx.commit().await.context("Failed to commit transfer")?;
        Ok(transaction)
    }

    /// All transactions the account took part in, newest first.
    ///
    /// Every call reads the current state of the log.
    pub async fn get_history(&self, username: &str) -> Result<Vec<Transaction>, LedgerError> {
        let mut conn = self.repo.acquire().await?;
        if !accounts::exists(&mut conn, username).await? {
            return Err(LedgerError::AccountNotFound(username.to_string()));
        }
        Ok(transaction_log::query(&mut conn, username).await?)
    }

    /// An account together with its history, newest first, read from one snapshot
    /// so the balance always agrees with the transactions.
    pub async fn get_statement(
        &self,
        username: &str,
    ) -> Result<(Account, Vec<Transaction>), LedgerError> {
        let mut tx = self.repo.begin().await?;
        let account = accounts::get(&mut tx, username)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(username.to_string()))?;
        let transactions = transaction_log::query(&mut tx, username).await?;
        tx.commit().await.context("Failed to finish statement snapshot")?;
        Ok((account, transactions))
    }

    // ========================
    // Integrity operations
    // ========================

    /// Check ledger integrity and return a report.
    /// Accounts and log are read from one consistent snapshot.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, LedgerError> {
        let mut tx = self.repo.begin().await?;
        let all_accounts = accounts::list(&mut tx).await?;
        let transactions = transaction_log::list_all(&mut tx).await?;
        tx.commit().await.context("Failed to finish integrity snapshot")?;

        let report = build_integrity_report(&all_accounts, &transactions);
        if !report.is_healthy() {
            warn!(issues = report.issues.len(), "ledger integrity check found issues");
        }
        Ok(report)
    }
}

/// Parse a user-entered amount, rejecting anything that is not a valid transfer amount.
pub fn parse_amount(input: &str) -> Result<Cents, LedgerError> {
    let cents = parse_cents(input).map_err(|e| LedgerError::InvalidAmount(e.to_string()))?;
    validate_amount(cents)?;
    Ok(cents)
}

fn validate_amount(amount_cents: Cents) -> Result<(), LedgerError> {
    if amount_cents <= 0 {
        return Err(LedgerError::InvalidAmount(
            "Amount must be positive".to_string(),
        ));
    }
    if amount_cents > MAX_AMOUNT_CENTS {
        return Err(LedgerError::InvalidAmount(
            "Amount exceeds the maximum transfer".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("30.00").unwrap(), 3000);
        assert_eq!(parse_amount("0.01").unwrap(), 1);
        assert!(matches!(
            parse_amount("0"),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            parse_amount("-5.00"),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            parse_amount("1.005"),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            parse_amount("lots"),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            parse_amount("10000000000.01"),
            Err(LedgerError::InvalidAmount(_))
        ));
    }
}
