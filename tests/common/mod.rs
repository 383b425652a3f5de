// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use strongbox::application::{AuthGateway, AuthSettings};
use strongbox::storage::StorageOptions;
use strongbox::Ledger;
use tempfile::TempDir;

pub const ALICE_PASSWORD: &str = "Alic3!secret";
pub const BOB_PASSWORD: &str = "B0b!secret";

/// A ledger and gateway over a fresh temporary database
pub async fn test_ledger() -> Result<(Ledger, AuthGateway, TempDir)> {
    test_ledger_with(AuthSettings::default(), StorageOptions::default()).await
}

pub async fn test_ledger_with(
    settings: AuthSettings,
    options: StorageOptions,
) -> Result<(Ledger, AuthGateway, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let ledger = Ledger::init(db_path.to_str().unwrap(), &options).await?;
    let gateway = AuthGateway::for_ledger(&ledger, settings);
    Ok((ledger, gateway, temp_dir))
}

/// Test fixture: registered users, each starting with 100.00 EUR
pub struct StandardUsers;

impl StandardUsers {
    /// Register alice and bob
    pub async fn create_pair(gateway: &AuthGateway) -> Result<()> {
        gateway.register("alice", ALICE_PASSWORD).await?;
        gateway.register("bob", BOB_PASSWORD).await?;
        Ok(())
    }

    /// Open `count` accounts named user00, user01, ... without credentials
    pub async fn open_many(ledger: &Ledger, count: usize, balance: i64) -> Result<Vec<String>> {
        let mut names = Vec::with_capacity(count);
        for i in 0..count {
            let name = format!("user{:02}", i);
            ledger.create_account(&name, balance).await?;
            names.push(name);
        }
        Ok(names)
    }
}
