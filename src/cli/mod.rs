mod shell;

pub use shell::Shell;

use std::io::{stdout, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::application::{parse_amount, AuthGateway, Ledger};
use crate::config::Config;
use crate::domain::{format_cents, Transaction};
use crate::io::Exporter;
use crate::telemetry;

/// Strongbox - single-tenant ledger
#[derive(Parser)]
#[command(name = "strongbox")]
#[command(about = "A single-tenant ledger: user accounts, balances and atomic transfers")]
#[command(version)]
pub struct Cli {
    /// Settings file (JSON)
    #[arg(short, long, global = true, env = "STRONGBOX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database file path (overrides the settings file)
    #[arg(short, long, global = true)]
    pub database: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Login for commands that act on behalf of a user
#[derive(Args)]
pub struct Credentials {
    /// Username
    #[arg(short, long, env = "STRONGBOX_USER")]
    pub user: String,

    /// Password
    #[arg(short, long, env = "STRONGBOX_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Table,
    Csv,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Register a user and open their account
    Register {
        /// Username (must be unique)
        username: String,

        /// Password
        #[arg(short, long, env = "STRONGBOX_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Show your balance
    Balance {
        #[command(flatten)]
        credentials: Credentials,
    },

    /// Show your transaction history, newest first
    History {
        #[command(flatten)]
        credentials: Credentials,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Transfer funds to another user
    Transfer {
        #[command(flatten)]
        credentials: Credentials,

        /// Recipient username
        to: String,

        /// Amount to transfer (e.g., "30.00" or "30")
        amount: String,
    },

    /// List every account and its balance
    Accounts {
        /// Print CSV instead of a table
        #[arg(long)]
        csv: bool,
    },

    /// Verify ledger integrity
    Check,

    /// Issue a one-time password reset token for a user
    ResetToken {
        username: String,
    },

    /// Set a new password using a reset token
    ResetPassword {
        username: String,

        /// Token from `reset-token`
        #[arg(short, long)]
        token: String,

        /// New password
        #[arg(short, long, env = "STRONGBOX_NEW_PASSWORD", hide_env_values = true)]
        new_password: String,
    },

    /// Interactive banking session
    Shell,
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(database) = &self.database {
            config.database = database.clone();
        }
        if self.verbose {
            config.log_filter = "debug".to_string();
        }
        Ok(config)
    }

    pub async fn run(self) -> Result<()> {
        let config = self.load_config()?;
        telemetry::init(&config.log_filter, config.log_format);

        let database = config.database_path()?.to_string();
        let options = config.storage_options();

        let ledger = if matches!(self.command, Commands::Init) {
            let ledger = Ledger::init(&database, &options).await?;
            println!("Database initialized: {}", database);
            ledger
        } else {
            Ledger::connect(&database, &options)
                .await
                .with_context(|| format!("Cannot open {}. Run `strongbox init` first?", database))?
        };
        let gateway = AuthGateway::for_ledger(&ledger, config.auth_settings());

        let result = run_command(&ledger, &gateway, self.command).await;
        ledger.repository().close().await;
        result
    }
}

async fn run_command(ledger: &Ledger, gateway: &AuthGateway, command: Commands) -> Result<()> {
    match command {
        // The database was created and migrated while connecting
        Commands::Init => {}

        Commands::Register { username, password } => {
            let identity = gateway.register(&username, &password).await?;
            println!(
                "Registered {}. Starting balance: {} EUR",
                identity,
                format_cents(gateway.settings().starting_balance)
            );
        }

        Commands::Balance { credentials } => {
            let identity = gateway
                .login(&credentials.user, &credentials.password)
                .await?;
            let balance = ledger.get_balance(identity.username()).await?;
            println!("Your current balance is: {} EUR", format_cents(balance));
        }

        Commands::History {
            credentials,
            format,
        } => {
            let identity = gateway
                .login(&credentials.user, &credentials.password)
                .await?;
            run_history_command(ledger, identity.username(), format).await?;
        }

        Commands::Transfer {
            credentials,
            to,
            amount,
        } => {
            let identity = gateway
                .login(&credentials.user, &credentials.password)
                .await?;
            let amount_cents = parse_amount(&amount)?;
            let transaction = ledger
                .transfer(identity.username(), &to, amount_cents)
                .await?;
            println!(
                "Transferred {} EUR to {} (transaction #{}, {})",
                format_cents(transaction.amount_cents),
                transaction.receiver,
                transaction.sequence,
                transaction.id
            );
        }

        Commands::Accounts { csv } => {
            if csv {
                Exporter::new(ledger).export_balances_csv(stdout()).await?;
            } else {
                run_accounts_command(ledger).await?;
            }
        }

        Commands::Check => run_check_command(ledger).await?,

        Commands::ResetToken { username } => {
            let token = gateway.issue_reset_token(&username).await?;
            println!("Reset token for {}: {}", username, token.secret());
            println!(
                "It expires in {} minutes and can be used once.",
                gateway.settings().reset_token_ttl.num_minutes()
            );
        }

        Commands::ResetPassword {
            username,
            token,
            new_password,
        } => {
            gateway
                .reset_password(&username, &token, &new_password)
                .await?;
            println!("Password reset successful.");
        }

        Commands::Shell => {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            Shell::new(ledger, gateway).run(stdin, &mut stdout()).await?;
        }
    }

    Ok(())
}

async fn run_history_command(ledger: &Ledger, username: &str, format: OutputFormat) -> Result<()> {
    let exporter = Exporter::new(ledger);
    match format {
        OutputFormat::Csv => {
            exporter.export_history_csv(username, stdout()).await?;
        }
        OutputFormat::Json => {
            exporter.export_history_json(username, stdout()).await?;
            println!();
        }
        OutputFormat::Table => {
            let transactions = ledger.get_history(username).await?;
            write_history(&mut stdout(), &transactions)?;
        }
    }
    Ok(())
}

async fn run_accounts_command(ledger: &Ledger) -> Result<()> {
    let accounts = ledger.list_accounts().await?;
    if accounts.is_empty() {
        println!("No accounts found.");
        return Ok(());
    }

    println!("{:<24} {:>14} {:>14}", "ACCOUNT", "BALANCE (EUR)", "NET (EUR)");
    println!("{}", "-".repeat(54));
    for account in &accounts {
        println!(
            "{:<24} {:>14} {:>14}",
            account.username,
            format_cents(account.balance),
            format_cents(account.net_flow())
        );
    }
    Ok(())
}

async fn run_check_command(ledger: &Ledger) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = ledger.check_integrity().await?;

    println!("Accounts:     {}", report.account_count);
    println!("Transactions: {}", report.transaction_count);
    println!();
    println!("  {:<16} {:>14}", "Opening total:", format_cents(report.opening_total));
    println!(
        "  {:<16} {:>14}  {}",
        "Balance total:",
        format_cents(report.balance_total),
        if report.is_conserved() {
            "OK"
        } else {
            "UNBALANCED!"
        }
    );
    println!();

    if report.is_healthy() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}

/// One history line: `<timestamp> - From: <sender> To: <receiver> Amount: <amount> EUR`
pub fn format_history_line(transaction: &Transaction) -> String {
    format!(
        "{} - From: {} To: {} Amount: {} EUR",
        transaction.timestamp.format("%Y-%m-%d %H:%M:%S"),
        transaction.sender,
        transaction.receiver,
        format_cents(transaction.amount_cents)
    )
}

pub(crate) fn write_history<W: Write>(out: &mut W, transactions: &[Transaction]) -> Result<()> {
    if transactions.is_empty() {
        writeln!(out, "No transactions found.")?;
        return Ok(());
    }
    writeln!(out, "Transaction History:")?;
    for transaction in transactions {
        writeln!(out, "{}", format_history_line(transaction))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_history_line() {
        let mut tx = Transaction::new("alice", "bob", 3000);
        tx.timestamp = chrono::Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();

        assert_eq!(
            format_history_line(&tx),
            "2024-03-01 12:30:00 - From: alice To: bob Amount: 30.00 EUR"
        );
    }

    #[test]
    fn test_write_empty_history() {
        let mut out = Vec::new();
        write_history(&mut out, &[]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "No transactions found.\n");
    }

    #[test]
    fn test_cli_parses_transfer() {
        let cli = Cli::try_parse_from([
            "strongbox",
            "--database",
            "test.db",
            "transfer",
            "--user",
            "alice",
            "--password",
            "Str0ng!pass",
            "bob",
            "30.00",
        ])
        .unwrap();

        match cli.command {
            Commands::Transfer {
                credentials,
                to,
                amount,
            } => {
                assert_eq!(credentials.user, "alice");
                assert_eq!(to, "bob");
                assert_eq!(amount, "30.00");
            }
            _ => panic!("expected transfer command"),
        }
        assert_eq!(cli.database, Some(PathBuf::from("test.db")));
    }
}
