//! Failures injected part-way through a transfer must leave no trace.

mod common;

use anyhow::Result;
use common::{test_ledger, StandardUsers};
use strongbox::{Ledger, LedgerError};

async fn install_trigger(ledger: &Ledger, sql: &str) -> Result<()> {
    sqlx::query(sql).execute(ledger.repository().pool()).await?;
    Ok(())
}

async fn drop_trigger(ledger: &Ledger, name: &str) -> Result<()> {
    sqlx::query(&format!("DROP TRIGGER {}", name))
        .execute(ledger.repository().pool())
        .await?;
    Ok(())
}

async fn assert_untouched(ledger: &Ledger) -> Result<()> {
    assert_eq!(ledger.get_balance("alice").await?, 10000);
    assert_eq!(ledger.get_balance("bob").await?, 10000);
    assert!(ledger.get_history("alice").await?.is_empty());
    assert!(ledger.get_history("bob").await?.is_empty());

    let report = ledger.check_integrity().await?;
    assert!(report.is_healthy(), "issues: {:?}", report.issues);
    assert_eq!(report.transaction_count, 0);
    Ok(())
}

#[tokio::test]
async fn test_failed_credit_rolls_back_debit() -> Result<()> {
    let (ledger, gateway, _temp) = test_ledger().await?;
    StandardUsers::create_pair(&gateway).await?;

    install_trigger(
        &ledger,
        r#"
        CREATE TRIGGER fail_credit
        BEFORE UPDATE OF balance_cents ON accounts
        WHEN NEW.username = 'bob'
        BEGIN
            SELECT RAISE(ABORT, 'injected credit failure');
        END
        "#,
    )
    .await?;

    let err = ledger.transfer("alice", "bob", 3000).await.unwrap_err();
    assert!(matches!(err, LedgerError::StorageFailure(_)), "got {:?}", err);
    assert!(err.is_retryable());
    assert!(err.to_string().contains("injected credit failure"));

    assert_untouched(&ledger).await?;
    Ok(())
}

#[tokio::test]
async fn test_failed_log_append_rolls_back_balances() -> Result<()> {
    let (ledger, gateway, _temp) = test_ledger().await?;
    StandardUsers::create_pair(&gateway).await?;

    install_trigger(
        &ledger,
        r#"
        CREATE TRIGGER fail_append
        BEFORE INSERT ON transactions
        BEGIN
            SELECT RAISE(ABORT, 'injected log failure');
        END
        "#,
    )
    .await?;

    let err = ledger.transfer("alice", "bob", 3000).await.unwrap_err();
    assert!(matches!(err, LedgerError::StorageFailure(_)), "got {:?}", err);

    assert_untouched(&ledger).await?;
    Ok(())
}

#[tokio::test]
async fn test_sequence_is_not_consumed_by_failed_transfer() -> Result<()> {
    let (ledger, gateway, _temp) = test_ledger().await?;
    StandardUsers::create_pair(&gateway).await?;

    install_trigger(
        &ledger,
        r#"
        CREATE TRIGGER fail_append
        BEFORE INSERT ON transactions
        BEGIN
            SELECT RAISE(ABORT, 'injected log failure');
        END
        "#,
    )
    .await?;
    assert!(ledger.transfer("alice", "bob", 100).await.is_err());
    assert!(ledger.transfer("bob", "alice", 100).await.is_err());
    drop_trigger(&ledger, "fail_append").await?;

    // Retrying after the fault clears succeeds, and numbering has no gap
    let transaction = ledger.transfer("alice", "bob", 100).await?;
    assert_eq!(transaction.sequence, 1);
    assert_eq!(ledger.get_balance("alice").await?, 9900);
    assert_eq!(ledger.get_balance("bob").await?, 10100);

    let report = ledger.check_integrity().await?;
    assert!(report.is_healthy(), "issues: {:?}", report.issues);
    Ok(())
}

#[tokio::test]
async fn test_failed_registration_leaves_no_user_or_account() -> Result<()> {
    let (ledger, gateway, _temp) = test_ledger().await?;

    install_trigger(
        &ledger,
        r#"
        CREATE TRIGGER fail_open
        BEFORE INSERT ON accounts
        BEGIN
            SELECT RAISE(ABORT, 'injected account failure');
        END
        "#,
    )
    .await?;

    assert!(gateway.register("alice", common::ALICE_PASSWORD).await.is_err());
    drop_trigger(&ledger, "fail_open").await?;

    // The credentials were rolled back with the account, so the name is free
    assert!(gateway.login("alice", common::ALICE_PASSWORD).await.is_err());
    gateway.register("alice", common::ALICE_PASSWORD).await?;
    assert_eq!(ledger.get_balance("alice").await?, 10000);
    Ok(())
}
