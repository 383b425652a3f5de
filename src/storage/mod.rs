pub mod accounts;
pub mod credentials;
mod repository;
pub mod transaction_log;

pub use repository::*;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

/// SQL migration for accounts and the transaction log
pub const MIGRATION_001_LEDGER: &str = include_str!("migrations/001_ledger.sql");

/// SQL migration for users and password reset tokens
pub const MIGRATION_002_CREDENTIALS: &str = include_str!("migrations/002_credentials.sql");

/// Timestamps are stored as fixed-width RFC 3339 strings so they sort lexicographically.
pub(crate) fn to_db_time(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn from_db_time(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid timestamp: {}", s))?
        .with_timezone(&Utc))
}
