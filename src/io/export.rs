use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

use crate::application::Ledger;
use crate::domain::{format_cents, Account, Transaction};

/// History snapshot for JSON export
#[derive(Debug, Clone, Serialize)]
pub struct HistorySnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub account: Account,
    pub transactions: Vec<Transaction>,
}

/// Exporter for converting ledger data to various formats
pub struct Exporter<'a> {
    ledger: &'a Ledger,
}

impl<'a> Exporter<'a> {
    pub fn new(ledger: &'a Ledger) -> Self {
        Self { ledger }
    }

    /// Export the history of one account to CSV format, newest first.
    /// `effect_cents` is the signed change the transaction made to this account.
    pub async fn export_history_csv<W: Write>(&self, username: &str, writer: W) -> Result<usize> {
        let transactions = self.ledger.get_history(username).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        // Write header
        csv_writer.write_record([
            "id",
            "sequence",
            "timestamp",
            "sender",
            "receiver",
            "amount",
            "amount_cents",
            "effect_cents",
        ])?;

        let mut count = 0;
        for tx in &transactions {
            csv_writer.write_record([
                tx.id.to_string(),
                tx.sequence.to_string(),
                tx.timestamp.to_rfc3339(),
                tx.sender.clone(),
                tx.receiver.clone(),
                format_cents(tx.amount_cents),
                tx.amount_cents.to_string(),
                tx.balance_effect(username).to_string(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export the history of one account as a JSON snapshot
    pub async fn export_history_json<W: Write>(
        &self,
        username: &str,
        mut writer: W,
    ) -> Result<HistorySnapshot> {
        let (account, transactions) = self.ledger.get_statement(username).await?;

        let snapshot = HistorySnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            account,
            transactions,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }

    /// Export all balances to CSV format
    pub async fn export_balances_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let accounts = self.ledger.list_accounts().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        // Write header
        csv_writer.write_record(["username", "balance", "balance_cents", "opened_at"])?;

        let mut count = 0;
        for account in &accounts {
            csv_writer.write_record([
                account.username.clone(),
                format_cents(account.balance),
                account.balance.to_string(),
                account.created_at.to_rfc3339(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }
}
