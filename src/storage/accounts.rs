//! Account store.
//!
//! Every function borrows a connection instead of the pool so it can take
//! part in a transaction opened by the caller.

use anyhow::{Context, Result};
use sqlx::{Row, SqliteConnection};

use crate::domain::{Account, Cents};

use super::{from_db_time, to_db_time};

/// Insert a new account. Returns false if the username is already taken.
pub async fn insert(conn: &mut SqliteConnection, account: &Account) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO accounts (username, balance_cents, opening_balance_cents, created_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(username) DO NOTHING
        "#,
    )
    .bind(&account.username)
    .bind(account.balance)
    .bind(account.opening_balance)
    .bind(to_db_time(account.created_at))
    .execute(&mut *conn)
    .await
    .context("Failed to save account")?;

    Ok(result.rows_affected() == 1)
}

pub async fn exists(conn: &mut SqliteConnection, username: &str) -> Result<bool> {
    let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM accounts WHERE username = ?) AS present")
        .bind(username)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to check account")?;

    Ok(row.get::<i64, _>("present") != 0)
}

/// Current balance, or None if the account does not exist.
pub async fn balance(conn: &mut SqliteConnection, username: &str) -> Result<Option<Cents>> {
    let row = sqlx::query("SELECT balance_cents FROM accounts WHERE username = ?")
        .bind(username)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch balance")?;

    Ok(row.map(|row| row.get("balance_cents")))
}

/// Add `delta` (which may be negative) to a balance.
///
/// The update only applies if the account exists and the new balance stays
/// non-negative. Returns whether it applied.
pub async fn adjust_balance(
    conn: &mut SqliteConnection,
    username: &str,
    delta: Cents,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE accounts
        SET balance_cents = balance_cents + ?
        WHERE username = ? AND balance_cents + ? >= 0
        "#,
    )
    .bind(delta)
    .bind(username)
    .bind(delta)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("Failed to adjust balance of {}", username))?;

    Ok(result.rows_affected() == 1)
}

pub async fn get(conn: &mut SqliteConnection, username: &str) -> Result<Option<Account>> {
    let row = sqlx::query(
        r#"
        SELECT username, balance_cents, opening_balance_cents, created_at
        FROM accounts
        WHERE username = ?
        "#,
    )
    .bind(username)
    .fetch_optional(&mut *conn)
    .await
    .context("Failed to fetch account")?;

    row.as_ref().map(row_to_account).transpose()
}

/// All accounts, ordered by username.
pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<Account>> {
    let rows = sqlx::query(
        r#"
        SELECT username, balance_cents, opening_balance_cents, created_at
        FROM accounts
        ORDER BY username
        "#,
    )
    .fetch_all(&mut *conn)
    .await
    .context("Failed to list accounts")?;

    rows.iter().map(row_to_account).collect()
}

fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Result<Account> {
    let created_at: String = row.get("created_at");

    Ok(Account {
        username: row.get("username"),
        balance: row.get("balance_cents"),
        opening_balance: row.get("opening_balance_cents"),
        created_at: from_db_time(&created_at)?,
    })
}
