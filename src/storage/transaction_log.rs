//! Append-only transaction log: records are never updated or deleted.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::domain::Transaction;

use super::{from_db_time, to_db_time};

/// Append a transaction. Assigns the next sequence number and the commit timestamp.
///
/// Must run inside the same database transaction as the balance updates it
/// records, so that the sequence is only consumed if everything commits.
pub async fn append(conn: &mut SqliteConnection, transaction: &mut Transaction) -> Result<()> {
    let row = sqlx::query(
        r#"
        UPDATE sequence_counter
        SET value = value + 1
        WHERE name = 'transaction_sequence'
        RETURNING value
        "#,
    )
    .fetch_one(&mut *conn)
    .await
    .context("Failed to get next sequence number")?;

    transaction.sequence = row.get("value");
    transaction.timestamp = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO transactions (id, sequence, sender, receiver, amount_cents, timestamp)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(transaction.id.to_string())
    .bind(transaction.sequence)
    .bind(&transaction.sender)
    .bind(&transaction.receiver)
    .bind(transaction.amount_cents)
    .bind(to_db_time(transaction.timestamp))
    .execute(&mut *conn)
    .await
    .context("Failed to append transaction")?;

    Ok(())
}

/// Transactions where the user is sender or receiver, newest first.
pub async fn query(conn: &mut SqliteConnection, username: &str) -> Result<Vec<Transaction>> {
    let rows = sqlx::query(
        r#"
        SELECT id, sequence, sender, receiver, amount_cents, timestamp
        FROM transactions
        WHERE sender = ? OR receiver = ?
        ORDER BY sequence DESC
        "#,
    )
    .bind(username)
    .bind(username)
    .fetch_all(&mut *conn)
    .await
    .context("Failed to query transactions")?;

    rows.iter().map(row_to_transaction).collect()
}

/// The whole log, oldest first.
pub async fn list_all(conn: &mut SqliteConnection) -> Result<Vec<Transaction>> {
    let rows = sqlx::query(
        r#"
        SELECT id, sequence, sender, receiver, amount_cents, timestamp
        FROM transactions
        ORDER BY sequence
        "#,
    )
    .fetch_all(&mut *conn)
    .await
    .context("Failed to list transactions")?;

    rows.iter().map(row_to_transaction).collect()
}

fn row_to_transaction(row: &sqlx::sqlite::SqliteRow) -> Result<Transaction> {
    let id_str: String = row.get("id");
    let timestamp_str: String = row.get("timestamp");

    Ok(Transaction {
        id: Uuid::parse_str(&id_str).context("Invalid transaction ID")?,
        sequence: row.get("sequence"),
        sender: row.get("sender"),
        receiver: row.get("receiver"),
        amount_cents: row.get("amount_cents"),
        timestamp: from_db_time(&timestamp_str)?,
    })
}
